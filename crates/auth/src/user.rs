//! Authenticated principal.

use serde::{Deserialize, Serialize};

use recognition_core::UserId;

/// The user a token resolves to.
///
/// `Auth` never builds users itself; they arrive inside tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Guest identity handed out when nobody is logged in.
    #[serde(default)]
    pub anonymous: bool,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            anonymous: false,
        }
    }

    /// Registered user with a fresh identifier.
    pub fn named(username: impl Into<String>) -> Self {
        Self::new(UserId::new(), username)
    }

    pub fn guest(username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            anonymous: true,
        }
    }
}
