//! `recognition-core` — identifiers and request context shared by the
//! authentication crates.
//!
//! Nothing in here performs IO.

pub mod context;
pub mod error;
pub mod id;

pub use context::RequestContext;
pub use error::{DomainError, DomainResult};
pub use id::{TokenId, UserId};
