//! `recognition-events` — synchronous, in-process event dispatch.
//!
//! Listeners run on the dispatching thread, in registration order, before
//! `dispatch` returns. There is no queueing and no persistence.

pub mod dispatcher;
pub mod event;
pub mod sync_dispatcher;

pub use dispatcher::{DispatchError, EventDispatcher, Listener};
pub use event::Event;
pub use sync_dispatcher::SyncEventDispatcher;
