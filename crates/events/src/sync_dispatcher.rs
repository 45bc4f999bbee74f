//! In-process dispatcher that runs listeners in-line.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::dispatcher::{DispatchError, EventDispatcher, Listener, pattern_matches};
use crate::Event;

/// Synchronous dispatcher.
///
/// - No IO / no async
/// - Listeners run in registration order on the caller's thread
/// - The listener table is snapshotted before a dispatch, so listeners may
///   register further listeners; those run from the next dispatch on
pub struct SyncEventDispatcher<E> {
    listeners: Mutex<Vec<(String, Listener<E>)>>,
}

impl<E> SyncEventDispatcher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of registered listeners (all patterns).
    pub fn listener_count(&self) -> Result<usize, DispatchError> {
        let listeners = self.listeners.lock().map_err(|_| DispatchError::Poisoned)?;
        Ok(listeners.len())
    }
}

impl<E: Event> SyncEventDispatcher<E> {
    /// Register a closure without wrapping it in an `Arc` first.
    pub fn listen<F>(&self, pattern: &str, listener: F) -> Result<(), DispatchError>
    where
        F: Fn(&E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_listener(pattern, Arc::new(listener))
    }
}

impl<E> Default for SyncEventDispatcher<E> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<E> core::fmt::Debug for SyncEventDispatcher<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncEventDispatcher")
            .field("listeners", &self.listener_count().ok())
            .finish()
    }
}

impl<E: Event> EventDispatcher<E> for SyncEventDispatcher<E> {
    fn add_listener(&self, pattern: &str, listener: Listener<E>) -> Result<(), DispatchError> {
        let mut listeners = self.listeners.lock().map_err(|_| DispatchError::Poisoned)?;
        listeners.push((pattern.to_string(), listener));
        Ok(())
    }

    fn dispatch(&self, event: &E) -> Result<bool, DispatchError> {
        let name = event.event_name();
        let matching: Vec<Listener<E>> = {
            let listeners = self.listeners.lock().map_err(|_| DispatchError::Poisoned)?;
            listeners
                .iter()
                .filter(|(pattern, _)| pattern_matches(pattern, name))
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        for listener in &matching {
            if let Err(err) = (**listener)(event) {
                warn!(event = name, error = %err, "event listener failed");
                return Err(DispatchError::Listener(err));
            }
        }

        debug!(event = name, listeners = matching.len(), "event dispatched");
        Ok(!matching.is_empty())
    }
}
