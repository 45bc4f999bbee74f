//! Notifications published by [`Auth`](crate::Auth).

use recognition_events::Event;

use crate::token::TokenKind;

/// Auth lifecycle notification.
///
/// Listeners observe these; they cannot supply tokens (that is what
/// [`FallbackTokenProvider`](crate::FallbackTokenProvider)s are for).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// Neither memory nor storage had a token; fallback providers are next.
    NoAuthToken,
    Authenticated { username: String, kind: TokenKind },
    Rejected { reasons: Vec<String> },
}

impl AuthEvent {
    pub const NO_AUTH_TOKEN: &'static str = "auth.no_token";
    pub const AUTHENTICATED: &'static str = "auth.authenticated";
    pub const REJECTED: &'static str = "auth.rejected";
}

impl Event for AuthEvent {
    fn event_name(&self) -> &'static str {
        match self {
            AuthEvent::NoAuthToken => Self::NO_AUTH_TOKEN,
            AuthEvent::Authenticated { .. } => Self::AUTHENTICATED,
            AuthEvent::Rejected { .. } => Self::REJECTED,
        }
    }
}
