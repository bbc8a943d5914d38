//! Engine events for observability.
//!
//! The orchestration engine reports each state transition of a run through
//! an [`EventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Emitted on every run state transition.
pub const PHASE_EVENT: &str = "composition.phase";
/// Emitted when a run succeeds.
pub const COMPLETED_EVENT: &str = "composition.completed";
/// Emitted when a run fails.
pub const FAILED_EVENT: &str = "composition.failed";
