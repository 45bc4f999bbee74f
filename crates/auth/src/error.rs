use thiserror::Error;

use recognition_events::DispatchError;

use crate::storage::StorageError;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The checker rejected the token. The message is the reasons, one per line.
    #[error("{}", .reasons.join("\n"))]
    AuthenticationFailed { reasons: Vec<String> },

    /// No token could be found in memory, in storage or from a fallback provider.
    #[error("unable to retrieve any auth token; no user available")]
    Unauthenticated,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Provider(anyhow::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl AuthError {
    /// Checker reasons for an `AuthenticationFailed`, empty otherwise.
    pub fn reasons(&self) -> &[String] {
        match self {
            AuthError::AuthenticationFailed { reasons } => reasons,
            _ => &[],
        }
    }
}
