//! `recognition-auth` — token-based authentication core.
//!
//! [`Auth`] resolves the current user for one request: it uses the token it
//! already holds, else the one in [`TokenStorage`], else asks the registered
//! [`FallbackTokenProvider`]s (e.g. the anonymous guest provider). Every
//! token it accepts goes through a [`TokenChecker`] first.
//!
//! This crate is decoupled from HTTP; the transport layer supplies a
//! [`RequestContext`](recognition_core::RequestContext) and a storage backend.

pub mod auth;
pub mod checker;
pub mod config;
pub mod error;
pub mod event;
pub mod fallback;
pub mod rules;
pub mod storage;
pub mod token;
pub mod user;

pub use auth::Auth;
pub use checker::TokenChecker;
pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use event::AuthEvent;
pub use fallback::{AnonymousTokenProvider, FallbackTokenProvider};
pub use rules::{TokenRule, TokenValidationError, default_rules};
pub use storage::{
    InMemoryTokenStorage, SessionStore, SessionTokenStorage, StorageError, StorageResult,
    TokenStorage,
};
pub use token::{AuthToken, TokenFactory, TokenKind};
pub use user::User;
