//! Event emission for observability.
//!
//! Pipeline runs and removals report progress through an [`EventSink`]. The
//! binary logs events via `tracing`; tests collect them.

mod event;
mod sink;

pub use event::{Event, EventType};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
