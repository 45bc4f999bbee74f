//! The per-request authentication service.

use std::sync::Arc;

use tracing::{debug, info, warn};

use recognition_core::RequestContext;
use recognition_events::EventDispatcher;

use crate::checker::TokenChecker;
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::event::AuthEvent;
use crate::fallback::FallbackTokenProvider;
use crate::rules::{TokenRule, default_rules};
use crate::storage::TokenStorage;
use crate::token::AuthToken;
use crate::user::User;

/// Accepts auth tokens and resolves the current user.
///
/// One instance serves exactly one request. Its only state is the token it
/// has accepted so far; [`handle`](Self::handle) is the only way in.
///
/// Retrieval order for [`get_user`](Self::get_user), stopping at the first hit:
///
/// 1. the token already accepted by this instance (not re-checked)
/// 2. the token in storage, re-checked through `handle`
/// 3. the fallback providers, in registration order, through `handle`
pub struct Auth<S: TokenStorage> {
    storage: S,
    request: RequestContext,
    rules: Vec<Box<dyn TokenRule>>,
    providers: Vec<Box<dyn FallbackTokenProvider>>,
    dispatcher: Option<Arc<dyn EventDispatcher<AuthEvent>>>,
    token: Option<AuthToken>,
}

impl<S: TokenStorage> Auth<S> {
    /// Service using the default rule set and no fallback providers.
    pub fn new(storage: S, request: RequestContext) -> Self {
        Self {
            storage,
            request,
            rules: default_rules(&AuthConfig::default()),
            providers: Vec::new(),
            dispatcher: None,
            token: None,
        }
    }

    /// Replace the rule set with the one derived from `config`.
    pub fn with_config(mut self, config: &AuthConfig) -> Self {
        self.rules = default_rules(config);
        self
    }

    /// Append an application-specific rule.
    pub fn with_rule(mut self, rule: impl TokenRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn with_rules(mut self, rules: Vec<Box<dyn TokenRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Register a fallback provider after the ones already registered.
    pub fn with_provider(mut self, provider: impl FallbackTokenProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher<AuthEvent>>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The token accepted so far, without triggering retrieval.
    pub fn current_token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// The authenticated user, retrieving a token first if necessary.
    pub fn get_user(&mut self) -> AuthResult<&User> {
        match self.ensure_token()? {
            Some(token) => {
                debug!(user = %token.user().username, "auth service returning user");
                Ok(token.user())
            }
            None => {
                warn!("no auth token available from memory, storage or fallback providers");
                Err(AuthError::Unauthenticated)
            }
        }
    }

    /// Check `token` against the current request and, if it passes, make it
    /// the current token and persist it.
    ///
    /// A rejected token is dropped: neither memory nor storage changes.
    /// The token is committed before the `Authenticated` notification, so a
    /// failing listener yields `Err(Dispatch)` while the token stays accepted.
    pub fn handle(&mut self, mut token: AuthToken) -> AuthResult<()> {
        info!(token_id = %token.id(), kind = %token.kind(), "auth token received, trying to authenticate");

        let rejected = {
            let checker = TokenChecker::new(&token, &self.request, &self.rules);
            if checker.is_valid() {
                None
            } else {
                Some(checker.errors())
            }
        };
        if let Some(reasons) = rejected {
            warn!(token_id = %token.id(), reasons = ?reasons, "auth token rejected");
            self.notify(&AuthEvent::Rejected {
                reasons: reasons.clone(),
            })?;
            return Err(AuthError::AuthenticationFailed { reasons });
        }

        token.mark_validated();
        self.storage.store_token(&token)?;

        let event = AuthEvent::Authenticated {
            username: token.user().username.clone(),
            kind: token.kind(),
        };
        info!(user = %token.user().username, kind = %token.kind(), "authenticated");
        self.token = Some(token);

        self.notify(&event)?;
        Ok(())
    }

    /// Drop the current token and clear storage.
    pub fn logout(&mut self) -> AuthResult<()> {
        if let Some(token) = self.token.take() {
            info!(user = %token.user().username, "logging out");
        }
        self.storage.clear_token()?;
        Ok(())
    }

    fn ensure_token(&mut self) -> AuthResult<Option<&AuthToken>> {
        if self.token.is_none() {
            if let Some(stored) = self.storage.get_token()? {
                info!(token_id = %stored.id(), "auth token found in storage");
                self.handle(stored)?;
            } else {
                info!("no auth token stored, trying fallback providers");
                self.run_fallback()?;
            }
        }

        Ok(self.token.as_ref())
    }

    fn run_fallback(&mut self) -> AuthResult<()> {
        if self.notify(&AuthEvent::NoAuthToken)? {
            debug!("no-token notification was picked up");
        }

        let mut answer = None;
        for provider in &self.providers {
            if let Some(token) = provider.provide(&self.request).map_err(AuthError::Provider)? {
                answer = Some((provider.name(), token));
                break;
            }
            debug!(provider = provider.name(), "fallback provider had no token");
        }

        match answer {
            Some((provider, token)) => {
                debug!(provider, "fallback provider supplied a token");
                self.handle(token)
            }
            None => Ok(()),
        }
    }

    fn notify(&self, event: &AuthEvent) -> AuthResult<bool> {
        match &self.dispatcher {
            Some(dispatcher) => Ok(dispatcher.dispatch(event)?),
            None => Ok(false),
        }
    }
}

impl<S: TokenStorage> core::fmt::Debug for Auth<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Auth")
            .field("request", &self.request)
            .field("rules", &self.rules.iter().map(|r| r.name()).collect::<Vec<_>>())
            .field("providers", &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;
    use proptest::prelude::*;
    use recognition_core::RequestContext;
    use recognition_events::SyncEventDispatcher;

    use super::*;
    use crate::fallback::AnonymousTokenProvider;
    use crate::rules::TokenValidationError;
    use crate::storage::{InMemoryTokenStorage, StorageError, StorageResult};
    use crate::token::{TokenFactory, TokenKind};

    #[derive(Debug, Default)]
    struct CountingStorage {
        inner: InMemoryTokenStorage,
        gets: AtomicUsize,
        stores: AtomicUsize,
    }

    impl CountingStorage {
        fn holding(token: AuthToken) -> Self {
            Self {
                inner: InMemoryTokenStorage::with_token(token),
                ..Self::default()
            }
        }

        fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }

        fn stores(&self) -> usize {
            self.stores.load(Ordering::SeqCst)
        }
    }

    impl TokenStorage for CountingStorage {
        fn get_token(&self) -> StorageResult<Option<AuthToken>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get_token()
        }

        fn store_token(&self, token: &AuthToken) -> StorageResult<()> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.inner.store_token(token)
        }

        fn clear_token(&self) -> StorageResult<()> {
            self.inner.clear_token()
        }
    }

    /// Passing rule that counts evaluations.
    struct CountingRule(Arc<AtomicUsize>);

    impl TokenRule for CountingRule {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn check(&self, _: &AuthToken, _: &RequestContext) -> Result<(), TokenValidationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct RejectWith(String);

    impl TokenRule for RejectWith {
        fn name(&self) -> &'static str {
            "reject_with"
        }

        fn check(&self, _: &AuthToken, _: &RequestContext) -> Result<(), TokenValidationError> {
            Err(TokenValidationError::Rejected(self.0.clone()))
        }
    }

    struct ScriptedProvider {
        name: &'static str,
        calls: Arc<AtomicUsize>,
        answer: Option<AuthToken>,
    }

    impl FallbackTokenProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        fn provide(&self, _: &RequestContext) -> anyhow::Result<Option<AuthToken>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    struct BrokenProvider;

    impl FallbackTokenProvider for BrokenProvider {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn provide(&self, _: &RequestContext) -> anyhow::Result<Option<AuthToken>> {
            anyhow::bail!("user directory unreachable")
        }
    }

    fn request() -> RequestContext {
        RequestContext::now().with_client_addr("203.0.113.9".parse().unwrap())
    }

    fn login(name: &str, request: &RequestContext) -> AuthToken {
        TokenFactory::default().native_login(User::named(name), request)
    }

    fn count_events(dispatcher: &SyncEventDispatcher<AuthEvent>, pattern: &str) -> Arc<AtomicUsize> {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        dispatcher
            .listen(pattern, move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        counter
    }

    #[test]
    fn handle_accepts_marks_and_stores() {
        let req = request();
        let mut auth = Auth::new(CountingStorage::default(), req.clone());

        auth.handle(login("alice", &req)).unwrap();

        let current = auth.current_token().unwrap();
        assert!(current.is_validated());
        assert_eq!(auth.storage().stores(), 1);
        assert_eq!(
            auth.storage().get_token().unwrap().unwrap().id(),
            auth.current_token().unwrap().id()
        );

        assert_eq!(auth.get_user().unwrap().username, "alice");
        // One explicit get above; retrieval itself never touched storage.
        assert_eq!(auth.storage().gets(), 1);
    }

    #[test]
    fn handle_rejects_without_side_effects() {
        let req = request();
        let stale = TokenFactory::default().native_login(
            User::named("alice"),
            &RequestContext::new(req.received_at() - Duration::hours(5))
                .with_client_addr(req.client_addr().unwrap()),
        );
        let mut auth = Auth::new(CountingStorage::default(), req);

        let err = auth.handle(stale).unwrap_err();
        assert!(matches!(err, AuthError::AuthenticationFailed { .. }));
        assert_eq!(err.to_string(), "token expired");
        assert!(auth.current_token().is_none());
        assert_eq!(auth.storage().stores(), 0);
        assert_eq!(auth.storage().inner.get_token().unwrap(), None);
    }

    #[test]
    fn stored_token_is_revalidated_without_fallback() {
        let req = request();
        let checks = Arc::new(AtomicUsize::new(0));
        let provider_calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        let no_token = count_events(&dispatcher, AuthEvent::NO_AUTH_TOKEN);

        let mut auth = Auth::new(CountingStorage::holding(login("alice", &req)), req)
            .with_rule(CountingRule(Arc::clone(&checks)))
            .with_provider(ScriptedProvider {
                name: "never",
                calls: Arc::clone(&provider_calls),
                answer: None,
            })
            .with_dispatcher(dispatcher.clone());

        assert_eq!(auth.get_user().unwrap().username, "alice");
        assert_eq!(auth.storage().gets(), 1);
        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert_eq!(auth.storage().stores(), 1);
        assert_eq!(no_token.load(Ordering::SeqCst), 0);
        assert_eq!(provider_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeated_get_user_does_no_further_work() {
        let req = request();
        let checks = Arc::new(AtomicUsize::new(0));
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        let all_events = count_events(&dispatcher, "*");

        let mut auth = Auth::new(CountingStorage::default(), req)
            .with_rule(CountingRule(Arc::clone(&checks)))
            .with_provider(AnonymousTokenProvider::default())
            .with_dispatcher(dispatcher.clone());

        auth.get_user().unwrap();
        let (gets, events) = (auth.storage().gets(), all_events.load(Ordering::SeqCst));

        assert_eq!(auth.get_user().unwrap().username, "guest");
        assert_eq!(auth.storage().gets(), gets);
        assert_eq!(checks.load(Ordering::SeqCst), 1);
        assert_eq!(all_events.load(Ordering::SeqCst), events);
    }

    #[test]
    fn fallback_provider_supplies_guest() {
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        let no_token = count_events(&dispatcher, AuthEvent::NO_AUTH_TOKEN);
        let authenticated = count_events(&dispatcher, AuthEvent::AUTHENTICATED);

        let mut auth = Auth::new(CountingStorage::default(), request())
            .with_provider(AnonymousTokenProvider::default())
            .with_dispatcher(dispatcher.clone());

        let user = auth.get_user().unwrap();
        assert!(user.anonymous);
        assert_eq!(user.username, "guest");
        assert_eq!(no_token.load(Ordering::SeqCst), 1);
        assert_eq!(authenticated.load(Ordering::SeqCst), 1);
        assert_eq!(auth.current_token().unwrap().kind(), TokenKind::Anonymous);
        assert_eq!(auth.storage().stores(), 1);
    }

    #[test]
    fn unanswered_fallback_is_unauthenticated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        let no_token = count_events(&dispatcher, AuthEvent::NO_AUTH_TOKEN);

        let mut auth = Auth::new(CountingStorage::default(), request())
            .with_provider(ScriptedProvider {
                name: "empty",
                calls: Arc::clone(&calls),
                answer: None,
            })
            .with_dispatcher(dispatcher.clone());

        assert!(matches!(auth.get_user(), Err(AuthError::Unauthenticated)));
        assert_eq!(no_token.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn first_answering_provider_wins() {
        let req = request();
        let (first, second, third) = (
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(AtomicUsize::new(0)),
        );

        let mut auth = Auth::new(InMemoryTokenStorage::new(), req.clone())
            .with_provider(ScriptedProvider {
                name: "first",
                calls: Arc::clone(&first),
                answer: None,
            })
            .with_provider(ScriptedProvider {
                name: "second",
                calls: Arc::clone(&second),
                answer: Some(login("bob", &req)),
            })
            .with_provider(ScriptedProvider {
                name: "third",
                calls: Arc::clone(&third),
                answer: Some(login("carol", &req)),
            });

        assert_eq!(auth.get_user().unwrap().username, "bob");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn provider_failure_propagates() {
        let mut auth = Auth::new(InMemoryTokenStorage::new(), request())
            .with_provider(BrokenProvider)
            .with_provider(AnonymousTokenProvider::default());

        let err = auth.get_user().unwrap_err();
        assert!(matches!(err, AuthError::Provider(_)));
        assert_eq!(err.to_string(), "user directory unreachable");
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn rejected_fallback_token_propagates() {
        let config = AuthConfig::default().with_anonymous(false);
        let mut auth = Auth::new(CountingStorage::default(), request())
            .with_config(&config)
            .with_provider(AnonymousTokenProvider::new(config.clone()));

        let err = auth.get_user().unwrap_err();
        assert_eq!(err.reasons(), ["anonymous tokens are disabled".to_string()]);
        assert_eq!(auth.storage().stores(), 0);
    }

    #[test]
    fn stored_token_from_other_client_is_rejected() {
        let minted_for = RequestContext::now().with_client_addr("198.51.100.1".parse().unwrap());
        let token = login("alice", &minted_for);
        let mut auth = Auth::new(CountingStorage::holding(token), request());

        let err = auth.get_user().unwrap_err();
        assert_eq!(err.to_string(), "token bound to a different client address");
        assert_eq!(auth.storage().stores(), 0);
        assert!(auth.current_token().is_none());
    }

    #[test]
    fn failing_listener_propagates() {
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        dispatcher
            .listen(AuthEvent::NO_AUTH_TOKEN, |_| anyhow::bail!("audit log full"))
            .unwrap();

        let mut auth = Auth::new(InMemoryTokenStorage::new(), request())
            .with_provider(AnonymousTokenProvider::default())
            .with_dispatcher(dispatcher);

        let err = auth.get_user().unwrap_err();
        assert!(matches!(err, AuthError::Dispatch(_)));
        assert_eq!(err.to_string(), "audit log full");
    }

    #[test]
    fn rejection_is_announced() {
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher
            .listen(AuthEvent::REJECTED, move |event| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            })
            .unwrap();

        let mut auth = Auth::new(InMemoryTokenStorage::new(), request())
            .with_rule(RejectWith("signature mismatch".into()))
            .with_dispatcher(dispatcher);
        let req = auth.request().clone();

        assert!(auth.handle(login("mallory", &req)).is_err());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![AuthEvent::Rejected {
                reasons: vec!["signature mismatch".to_string()]
            }]
        );
    }

    #[test]
    fn logout_clears_memory_and_storage() {
        let req = request();
        let mut auth = Auth::new(CountingStorage::default(), req.clone());
        auth.handle(login("alice", &req)).unwrap();

        auth.logout().unwrap();
        assert!(!auth.is_authenticated());
        assert_eq!(auth.storage().inner.get_token().unwrap(), None);
        assert!(matches!(auth.get_user(), Err(AuthError::Unauthenticated)));
    }

    struct FailingStorage {
        on_get: bool,
    }

    impl TokenStorage for FailingStorage {
        fn get_token(&self) -> StorageResult<Option<AuthToken>> {
            if self.on_get {
                Err(StorageError::Backend("session backend down".into()))
            } else {
                Ok(None)
            }
        }

        fn store_token(&self, _: &AuthToken) -> StorageResult<()> {
            Err(StorageError::Backend("session backend down".into()))
        }

        fn clear_token(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_store_leaves_nothing_accepted() {
        let req = request();
        let mut auth = Auth::new(FailingStorage { on_get: false }, req.clone());

        let err = auth.handle(login("alice", &req)).unwrap_err();
        assert!(matches!(err, AuthError::Storage(StorageError::Backend(_))));
        assert_eq!(err.to_string(), "storage error: session backend down");
        assert!(auth.current_token().is_none());
    }

    #[test]
    fn failed_load_skips_fallback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        let no_token = count_events(&dispatcher, AuthEvent::NO_AUTH_TOKEN);

        let mut auth = Auth::new(FailingStorage { on_get: true }, request())
            .with_provider(ScriptedProvider {
                name: "guest",
                calls: Arc::clone(&calls),
                answer: None,
            })
            .with_dispatcher(dispatcher.clone());

        assert!(matches!(auth.get_user(), Err(AuthError::Storage(StorageError::Backend(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(no_token.load(Ordering::SeqCst), 0);
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn committed_token_survives_failing_listener() {
        let dispatcher = SyncEventDispatcher::<AuthEvent>::arc();
        dispatcher
            .listen(AuthEvent::AUTHENTICATED, |_| anyhow::bail!("audit log full"))
            .unwrap();
        let req = request();
        let mut auth = Auth::new(CountingStorage::default(), req.clone()).with_dispatcher(dispatcher);

        assert!(matches!(auth.handle(login("alice", &req)), Err(AuthError::Dispatch(_))));
        assert_eq!(auth.storage().stores(), 1);
        assert_eq!(auth.get_user().unwrap().username, "alice");
    }

    #[test]
    fn extreme_durations_do_not_panic() {
        let config = AuthConfig::default()
            .with_token_ttl(Duration::seconds(10_000_000_000_000))
            .with_max_clock_skew(Duration::seconds(10_000_000_000_000));
        let mut auth = Auth::new(CountingStorage::default(), request())
            .with_config(&config)
            .with_provider(AnonymousTokenProvider::new(config.clone()));

        assert_eq!(auth.get_user().unwrap().username, "guest");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: a rejection message carries every reason, in rule order,
        /// and nothing is retained or persisted.
        #[test]
        fn rejection_reports_every_reason(reasons in prop::collection::vec("[a-z][a-z ]{0,20}", 1..6)) {
            let req = request();
            let rules: Vec<Box<dyn TokenRule>> = reasons
                .iter()
                .map(|r| Box::new(RejectWith(r.clone())) as Box<dyn TokenRule>)
                .collect();
            let mut auth = Auth::new(CountingStorage::default(), req.clone()).with_rules(rules);

            let err = auth.handle(login("alice", &req)).unwrap_err();
            prop_assert_eq!(err.reasons(), reasons.as_slice());
            prop_assert_eq!(err.to_string(), reasons.join("\n"));
            prop_assert!(auth.current_token().is_none());
            prop_assert_eq!(auth.storage().stores(), 0);
        }
    }
}
