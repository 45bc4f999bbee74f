//! Token persistence across requests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::token::AuthToken;

pub type StorageResult<T> = Result<T, StorageError>;

/// Where `Auth` keeps the accepted token between requests.
///
/// Implementations own their transport (session, cookie, database) and their
/// consistency guarantees. `Auth` never retries a failed call.
pub trait TokenStorage: Send + Sync {
    /// The previously stored token, if any.
    fn get_token(&self) -> StorageResult<Option<AuthToken>>;

    /// Persist `token`, replacing whatever was stored before.
    fn store_token(&self, token: &AuthToken) -> StorageResult<()>;

    /// Forget the stored token.
    fn clear_token(&self) -> StorageResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("token storage lock poisoned")]
    Poisoned,
    #[error("stored token is corrupt: {0}")]
    Corrupt(String),
    #[error("storage error: {0}")]
    Backend(String),
}

impl<S> TokenStorage for Arc<S>
where
    S: TokenStorage + ?Sized,
{
    fn get_token(&self) -> StorageResult<Option<AuthToken>> {
        (**self).get_token()
    }

    fn store_token(&self, token: &AuthToken) -> StorageResult<()> {
        (**self).store_token(token)
    }

    fn clear_token(&self) -> StorageResult<()> {
        (**self).clear_token()
    }
}

/// Single-slot storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTokenStorage {
    slot: Mutex<Option<AuthToken>>,
}

impl InMemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_token(token: AuthToken) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
        }
    }
}

impl TokenStorage for InMemoryTokenStorage {
    fn get_token(&self) -> StorageResult<Option<AuthToken>> {
        let slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(slot.clone())
    }

    fn store_token(&self, token: &AuthToken) -> StorageResult<()> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *slot = Some(token.clone());
        Ok(())
    }

    fn clear_token(&self) -> StorageResult<()> {
        let mut slot = self.slot.lock().map_err(|_| StorageError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}

/// Process-wide session data: session id → key → JSON value.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, session_id: &str, key: &str) -> StorageResult<Option<String>> {
        let sessions = self.sessions.read().map_err(|_| StorageError::Poisoned)?;
        Ok(sessions
            .get(session_id)
            .and_then(|data| data.get(key))
            .cloned())
    }

    pub fn set(&self, session_id: &str, key: &str, value: String) -> StorageResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| StorageError::Poisoned)?;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove(&self, session_id: &str, key: &str) -> StorageResult<()> {
        let mut sessions = self.sessions.write().map_err(|_| StorageError::Poisoned)?;
        if let Some(data) = sessions.get_mut(session_id) {
            data.remove(key);
            if data.is_empty() {
                sessions.remove(session_id);
            }
        }
        Ok(())
    }

    pub fn session_count(&self) -> StorageResult<usize> {
        let sessions = self.sessions.read().map_err(|_| StorageError::Poisoned)?;
        Ok(sessions.len())
    }
}

/// Token storage scoped to one session of a shared [`SessionStore`].
///
/// Tokens are kept as JSON; the validity flag is not part of the encoding.
#[derive(Debug, Clone)]
pub struct SessionTokenStorage {
    store: Arc<SessionStore>,
    session_id: String,
}

impl SessionTokenStorage {
    pub const TOKEN_KEY: &'static str = "auth.token";

    pub fn new(store: Arc<SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl TokenStorage for SessionTokenStorage {
    fn get_token(&self) -> StorageResult<Option<AuthToken>> {
        let Some(raw) = self.store.get(&self.session_id, Self::TOKEN_KEY)? else {
            return Ok(None);
        };
        let token = serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt(e.to_string()))?;
        debug!(session = %self.session_id, "loaded auth token from session");
        Ok(Some(token))
    }

    fn store_token(&self, token: &AuthToken) -> StorageResult<()> {
        let raw = serde_json::to_string(token).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.store.set(&self.session_id, Self::TOKEN_KEY, raw)
    }

    fn clear_token(&self) -> StorageResult<()> {
        self.store.remove(&self.session_id, Self::TOKEN_KEY)
    }
}
