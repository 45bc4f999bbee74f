//! Individual token checks.
//!
//! A [`TokenChecker`](crate::TokenChecker) runs every rule against one
//! token/request pair and collects the failures in rule order.

use chrono::Duration;
use thiserror::Error;

use recognition_core::RequestContext;

use crate::config::AuthConfig;
use crate::token::{AuthToken, TokenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window")]
    InvalidTimeWindow,

    #[error("token has no associated user")]
    MissingUser,

    #[error("token bound to a different client address")]
    ClientMismatch,

    #[error("anonymous tokens are disabled")]
    AnonymousDisabled,

    /// Failure reported by an application-specific rule.
    #[error("{0}")]
    Rejected(String),
}

/// One acceptance criterion for a token.
///
/// Rules must be pure: same token and request, same answer.
pub trait TokenRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, token: &AuthToken, request: &RequestContext) -> Result<(), TokenValidationError>;
}

/// Rules derived from `config`, in evaluation order.
pub fn default_rules(config: &AuthConfig) -> Vec<Box<dyn TokenRule>> {
    vec![
        Box::new(TimeWindow {
            max_clock_skew: config.max_clock_skew,
        }),
        Box::new(UserPresent),
        Box::new(ClientBinding),
        Box::new(AnonymousPolicy {
            allow: config.allow_anonymous,
        }),
    ]
}

/// Issue/expiry window against the request time.
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub max_clock_skew: Duration,
}

impl TokenRule for TimeWindow {
    fn name(&self) -> &'static str {
        "time_window"
    }

    fn check(&self, token: &AuthToken, request: &RequestContext) -> Result<(), TokenValidationError> {
        let now = request.received_at();
        if token.expires_at() <= token.issued_at() {
            return Err(TokenValidationError::InvalidTimeWindow);
        }
        // A skew reaching past the representable range accepts any issue time.
        let latest_issue = now.checked_add_signed(self.max_clock_skew);
        if latest_issue.is_some_and(|latest| latest < token.issued_at()) {
            return Err(TokenValidationError::NotYetValid);
        }
        if now >= token.expires_at() {
            return Err(TokenValidationError::Expired);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UserPresent;

impl TokenRule for UserPresent {
    fn name(&self) -> &'static str {
        "user_present"
    }

    fn check(&self, token: &AuthToken, _request: &RequestContext) -> Result<(), TokenValidationError> {
        if token.user().username.trim().is_empty() {
            Err(TokenValidationError::MissingUser)
        } else {
            Ok(())
        }
    }
}

/// A token bound to an address is only good for requests from that address.
#[derive(Debug, Clone, Copy)]
pub struct ClientBinding;

impl TokenRule for ClientBinding {
    fn name(&self) -> &'static str {
        "client_binding"
    }

    fn check(&self, token: &AuthToken, request: &RequestContext) -> Result<(), TokenValidationError> {
        match token.bound_addr() {
            Some(bound) if request.client_addr() != Some(bound) => {
                Err(TokenValidationError::ClientMismatch)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnonymousPolicy {
    pub allow: bool,
}

impl TokenRule for AnonymousPolicy {
    fn name(&self) -> &'static str {
        "anonymous_policy"
    }

    fn check(&self, token: &AuthToken, _request: &RequestContext) -> Result<(), TokenValidationError> {
        if token.kind() == TokenKind::Anonymous && !self.allow {
            Err(TokenValidationError::AnonymousDisabled)
        } else {
            Ok(())
        }
    }
}
