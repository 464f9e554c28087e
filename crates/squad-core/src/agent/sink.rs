//! The log sink capability injected into the dispatcher.

use super::types::LogEvent;

/// Consumer of progress events. Implementations must be cheap and must not
/// block for long: they are called from inside the supervising loop.
pub trait LogSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

impl<F> LogSink for F
where
    F: Fn(LogEvent) + Send + Sync,
{
    fn emit(&self, event: LogEvent) {
        self(event)
    }
}

/// A sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _event: LogEvent) {}
}
