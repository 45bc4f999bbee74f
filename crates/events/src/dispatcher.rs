//! Event dispatcher abstraction.

use std::sync::Arc;

use thiserror::Error;

use crate::Event;

/// A registered listener callback.
///
/// A listener that returns an error aborts the dispatch; the error reaches the
/// publisher unchanged.
pub type Listener<E> = Arc<dyn Fn(&E) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A listener failed; remaining listeners were not run.
    #[error(transparent)]
    Listener(anyhow::Error),

    /// The listener table lock was poisoned by a panicking listener.
    #[error("event dispatcher lock poisoned")]
    Poisoned,
}

/// Synchronous publish mechanism.
///
/// Listener patterns are matched against [`Event::event_name`]:
///
/// - an exact name (`"auth.no_token"`)
/// - a prefix wildcard (`"auth.*"`)
/// - `"*"` for every event
///
/// `dispatch` returns `Ok(true)` when at least one listener ran.
pub trait EventDispatcher<E: Event>: Send + Sync {
    fn add_listener(&self, pattern: &str, listener: Listener<E>) -> Result<(), DispatchError>;

    fn dispatch(&self, event: &E) -> Result<bool, DispatchError>;
}

impl<E, D> EventDispatcher<E> for Arc<D>
where
    E: Event,
    D: EventDispatcher<E> + ?Sized,
{
    fn add_listener(&self, pattern: &str, listener: Listener<E>) -> Result<(), DispatchError> {
        (**self).add_listener(pattern, listener)
    }

    fn dispatch(&self, event: &E) -> Result<bool, DispatchError> {
        (**self).dispatch(event)
    }
}

/// Whether a listener pattern selects an event name.
pub(crate) fn pattern_matches(pattern: &str, event_name: &str) -> bool {
    if pattern == "*" || pattern == event_name {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => event_name
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.')),
        None => false,
    }
}
