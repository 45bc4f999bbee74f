//! Fallback token providers.
//!
//! When neither memory nor storage holds a token, `Auth` asks its providers
//! in registration order. The first one to return a token wins.

use recognition_core::RequestContext;

use crate::config::AuthConfig;
use crate::token::{AuthToken, TokenFactory};

pub trait FallbackTokenProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// A token for `request`, or `None` to let the next provider answer.
    ///
    /// Errors abort the fallback round and reach the caller unchanged.
    fn provide(&self, request: &RequestContext) -> anyhow::Result<Option<AuthToken>>;
}

/// Hands every visitor a guest token.
#[derive(Debug, Clone, Default)]
pub struct AnonymousTokenProvider {
    factory: TokenFactory,
}

impl AnonymousTokenProvider {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            factory: TokenFactory::new(config),
        }
    }
}

impl FallbackTokenProvider for AnonymousTokenProvider {
    fn name(&self) -> &'static str {
        "anonymous"
    }

    fn provide(&self, request: &RequestContext) -> anyhow::Result<Option<AuthToken>> {
        Ok(Some(self.factory.anonymous(request)))
    }
}
