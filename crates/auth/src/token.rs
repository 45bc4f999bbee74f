//! Auth tokens and the factory that mints them.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use recognition_core::{RequestContext, TokenId};

use crate::config::AuthConfig;
use crate::user::User;

/// How a token came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    /// Issued after a successful username/password login.
    NativeLogin,
    /// Guest identity handed out by the anonymous fallback provider.
    Anonymous,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::NativeLogin => "native-login",
            TokenKind::Anonymous => "anonymous",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claim of identity for the current session.
///
/// The validity flag is never serialized, so a token read back from storage
/// always starts out unvalidated. Only the crate can set it, and it does so
/// only after a [`TokenChecker`](crate::TokenChecker) accepted the token for
/// the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    id: TokenId,
    kind: TokenKind,
    user: User,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bound_addr: Option<IpAddr>,
    #[serde(skip)]
    validated: bool,
}

impl AuthToken {
    pub fn new(
        kind: TokenKind,
        user: User,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TokenId::new(),
            kind,
            user,
            issued_at,
            expires_at,
            bound_addr: None,
            validated: false,
        }
    }

    /// Restrict the token to requests from `addr`.
    pub fn bound_to(mut self, addr: IpAddr) -> Self {
        self.bound_addr = Some(addr);
        self
    }

    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn bound_addr(&self) -> Option<IpAddr> {
        self.bound_addr
    }

    /// `<kind>:<username>`, e.g. `native-login:alice`.
    pub fn credential(&self) -> String {
        format!("{}:{}", self.kind, self.user.username)
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    pub(crate) fn mark_validated(&mut self) {
        self.validated = true;
    }
}

/// Mints tokens using the configured lifetime and client binding.
#[derive(Debug, Clone, Default)]
pub struct TokenFactory {
    config: AuthConfig,
}

impl TokenFactory {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Token for a user who just logged in.
    pub fn native_login(&self, user: User, request: &RequestContext) -> AuthToken {
        self.mint(TokenKind::NativeLogin, user, request)
    }

    /// Guest token for whoever sent `request`.
    pub fn anonymous(&self, request: &RequestContext) -> AuthToken {
        let guest = User::guest(self.config.guest_username.clone());
        self.mint(TokenKind::Anonymous, guest, request)
    }

    fn mint(&self, kind: TokenKind, user: User, request: &RequestContext) -> AuthToken {
        let issued_at = request.received_at();
        // Lifetimes past the end of the representable range are clamped.
        let expires_at = issued_at
            .checked_add_signed(self.config.token_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let token = AuthToken::new(kind, user, issued_at, expires_at);

        match request.client_addr() {
            Some(addr) if self.config.bind_to_client_addr => token.bound_to(addr),
            _ => token,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_binds_to_client_when_configured() {
        let request = RequestContext::now().with_client_addr("192.168.1.20".parse().unwrap());

        let bound = TokenFactory::default().native_login(User::named("alice"), &request);
        assert_eq!(bound.bound_addr(), request.client_addr());
        assert_eq!(bound.expires_at() - bound.issued_at(), AuthConfig::default().token_ttl);
        assert_eq!(bound.credential(), "native-login:alice");

        let factory = TokenFactory::new(AuthConfig::default().with_client_binding(false));
        assert_eq!(factory.anonymous(&request).bound_addr(), None);
    }

    #[test]
    fn oversized_ttl_is_clamped() {
        let config = AuthConfig::default().with_token_ttl(chrono::Duration::seconds(10_000_000_000_000));
        let token = TokenFactory::new(config).anonymous(&RequestContext::now());
        assert_eq!(token.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(token.expires_at() > token.issued_at());
    }

    #[test]
    fn validity_flag_is_not_persisted() {
        let mut token = TokenFactory::default().anonymous(&RequestContext::now());
        token.mark_validated();
        assert!(token.is_validated());

        let json = serde_json::to_string(&token).unwrap();
        assert!(!json.contains("validated"));

        let restored: AuthToken = serde_json::from_str(&json).unwrap();
        assert!(!restored.is_validated());
        assert_eq!(restored.id(), token.id());
        assert!(restored.user().anonymous);
        assert_eq!(restored.credential(), "anonymous:guest");
    }
}
