//! Consumers of decoded note events.

use crate::midi::DecodedEvent;

pub trait EventSink {
    /// Invoked on the reader thread, once per event and in packet order.
    fn observe(&mut self, event: DecodedEvent);
}

/// Writes one log line per event.
#[derive(Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn observe(&mut self, event: DecodedEvent) {
        log::info!("{event}");
    }
}

impl EventSink for Vec<DecodedEvent> {
    fn observe(&mut self, event: DecodedEvent) {
        self.push(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn observe(&mut self, event: DecodedEvent) {
        (**self).observe(event);
    }
}
