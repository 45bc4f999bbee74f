//! Token acceptance check for one request.

use std::cell::OnceCell;

use tracing::debug;

use recognition_core::RequestContext;

use crate::rules::{TokenRule, TokenValidationError};
use crate::token::AuthToken;

/// Decides whether one token is acceptable for one request.
///
/// The verdict is computed on first use and cached; repeated calls do not
/// re-run the rules. Every rule runs, so [`errors`](Self::errors) lists all
/// reasons rather than only the first.
pub struct TokenChecker<'a> {
    token: &'a AuthToken,
    request: &'a RequestContext,
    rules: &'a [Box<dyn TokenRule>],
    failures: OnceCell<Vec<TokenValidationError>>,
}

impl<'a> TokenChecker<'a> {
    pub fn new(
        token: &'a AuthToken,
        request: &'a RequestContext,
        rules: &'a [Box<dyn TokenRule>],
    ) -> Self {
        Self {
            token,
            request,
            rules,
            failures: OnceCell::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.violations().is_empty()
    }

    /// Failure reasons in rule order; empty when the token is valid.
    pub fn errors(&self) -> Vec<String> {
        self.violations().iter().map(ToString::to_string).collect()
    }

    pub fn violations(&self) -> &[TokenValidationError] {
        self.failures.get_or_init(|| {
            self.rules
                .iter()
                .filter_map(|rule| match rule.check(self.token, self.request) {
                    Ok(()) => None,
                    Err(err) => {
                        debug!(rule = rule.name(), token_id = %self.token.id(), reason = %err, "token rule failed");
                        Some(err)
                    }
                })
                .collect()
        })
    }
}

impl core::fmt::Debug for TokenChecker<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenChecker")
            .field("token", &self.token.id())
            .field("rules", &self.rules.len())
            .field("failures", &self.failures.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;

    use super::*;
    use crate::config::AuthConfig;
    use crate::rules::default_rules;
    use crate::token::TokenFactory;
    use crate::user::User;

    struct Counting(Arc<AtomicUsize>);

    impl TokenRule for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _: &AuthToken, _: &RequestContext) -> Result<(), TokenValidationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(TokenValidationError::Rejected("counted".into()))
        }
    }

    #[test]
    fn valid_token_has_no_errors() {
        let request = RequestContext::now();
        let token = TokenFactory::default().native_login(User::named("alice"), &request);
        let rules = default_rules(&AuthConfig::default());

        let checker = TokenChecker::new(&token, &request, &rules);
        assert!(checker.is_valid());
        assert!(checker.errors().is_empty());
    }

    #[test]
    fn expired_token_reports_reason() {
        let minted = RequestContext::now();
        let token = TokenFactory::default().native_login(User::named("alice"), &minted);
        let later = RequestContext::new(minted.received_at() + Duration::hours(3));
        let rules = default_rules(&AuthConfig::default());

        let checker = TokenChecker::new(&token, &later, &rules);
        assert!(!checker.is_valid());
        assert_eq!(checker.errors(), vec!["token expired".to_string()]);
    }

    #[test]
    fn all_failures_collected_in_order() {
        let request = RequestContext::now();
        let token = TokenFactory::default().anonymous(&request);
        let config = AuthConfig::default().with_anonymous(false);
        let mut rules = default_rules(&config);
        rules.push(Box::new(Counting(Arc::new(AtomicUsize::new(0)))));

        let checker = TokenChecker::new(&token, &request, &rules);
        assert_eq!(
            checker.errors(),
            vec!["anonymous tokens are disabled".to_string(), "counted".to_string()]
        );
    }

    #[test]
    fn verdict_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let rules: Vec<Box<dyn TokenRule>> = vec![Box::new(Counting(Arc::clone(&calls)))];
        let request = RequestContext::now();
        let token = TokenFactory::default().anonymous(&request);

        let checker = TokenChecker::new(&token, &request, &rules);
        assert!(!checker.is_valid());
        assert!(!checker.is_valid());
        assert_eq!(checker.errors().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
