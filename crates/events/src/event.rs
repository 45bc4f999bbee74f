/// An event that can be dispatched to named listeners.
///
/// Events are notifications: listeners receive a shared reference and cannot
/// change the event or the publisher.
pub trait Event: core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "auth.no_token").
    fn event_name(&self) -> &'static str;
}
