//! Event sink trait and implementations.

use super::{Event, EventType};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

/// Receives events from pipeline runs and removals.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event. Sinks log and drop anything they cannot deliver.
    async fn emit(&self, event: Event);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}

/// Logs events through `tracing`: failures at `WARN`, everything else at
/// `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: Event) {
        let run_id = event.run_id.map(|id| id.to_string()).unwrap_or_default();
        if event.event_type.is_failure() {
            warn!(event_type = %event.event_type, run_id = %run_id, data = %event.data, "Event: {}", event.event_type);
        } else {
            info!(event_type = %event.event_type, run_id = %run_id, data = %event.data, "Event: {}", event.event_type);
        }
    }
}

/// Keeps every event in memory, for tests and reports.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<Event>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn types(&self) -> Vec<EventType> {
        self.events.read().iter().map(|e| e.event_type).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns events of one type.
    #[must_use]
    pub fn events_of_type(&self, event_type: EventType) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: Event) {
        self.events.write().push(event);
    }
}
