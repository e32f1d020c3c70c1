//! Run events for reporting collaborators.
//!
//! The orchestrator reports the lifecycle of a run and the terminal outcome
//! of every file through an [`EventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
