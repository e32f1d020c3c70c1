//! Event types, the sink trait and its implementations.

use crate::pipeline::RunPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, Level};
use uuid::Uuid;

/// An event emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// Files were selected and dispatch is about to begin.
    #[serde(rename = "run.started")]
    RunStarted {
        /// Run id.
        run_id: Uuid,
        /// Number of files to process.
        files: usize,
        /// Enabled stages in chain order.
        stages: Vec<String>,
        /// Worker concurrency limit.
        concurrency: usize,
        /// Run policy.
        policy: RunPolicy,
    },
    /// Every dispatched file reached a terminal outcome.
    #[serde(rename = "run.completed")]
    RunCompleted {
        /// Run id.
        run_id: Uuid,
        /// Files completed.
        completed: usize,
        /// Files skipped.
        skipped: usize,
        /// Files failed.
        failed: usize,
        /// Files never dispatched.
        not_started: usize,
    },
    /// The run stopped early, through the abort policy or a fatal error.
    #[serde(rename = "run.aborted")]
    RunAborted {
        /// Run id.
        run_id: Uuid,
        /// Why the run stopped.
        reason: String,
    },
    /// A file completed every enabled stage.
    #[serde(rename = "file.completed")]
    FileCompleted {
        /// Run id.
        run_id: Uuid,
        /// Input file.
        file: PathBuf,
        /// Chain duration in milliseconds.
        duration_ms: f64,
    },
    /// A stage skipped a file.
    #[serde(rename = "file.skipped")]
    FileSkipped {
        /// Run id.
        run_id: Uuid,
        /// Input file.
        file: PathBuf,
        /// Skipping stage.
        stage: String,
        /// Skip reason.
        reason: String,
    },
    /// A stage failed on a file.
    #[serde(rename = "file.failed")]
    FileFailed {
        /// Run id.
        run_id: Uuid,
        /// Input file.
        file: PathBuf,
        /// Failing stage.
        stage: String,
        /// Error kind.
        kind: String,
        /// Error message.
        message: String,
    },
}

impl RunEvent {
    /// Returns the dotted event type, e.g. "file.skipped".
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::RunCompleted { .. } => "run.completed",
            Self::RunAborted { .. } => "run.aborted",
            Self::FileCompleted { .. } => "file.completed",
            Self::FileSkipped { .. } => "file.skipped",
            Self::FileFailed { .. } => "file.failed",
        }
    }
}

/// Receives run events.
///
/// Implementations must not fail: a broken reporting channel never affects
/// processing.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    async fn emit(&self, event: &RunEvent);
}

/// A no-op event sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: &RunEvent) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: &RunEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        if self.level == Level::DEBUG {
            debug!(event_type = event.event_type(), event_data = %payload, "Event: {}", event.event_type());
        } else {
            info!(event_type = event.event_type(), event_data = %payload, "Event: {}", event.event_type());
        }
    }
}

/// A collecting event sink, used in tests and by embedding applications.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<RunEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<RunEvent> {
        self.events.read().clone()
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

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<RunEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: &RunEvent) {
        self.events.write().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skipped() -> RunEvent {
        RunEvent::FileSkipped {
            run_id: Uuid::nil(),
            file: PathBuf::from("/l1b/a.nc"),
            stage: "alg_skip_on_mode".into(),
            reason: "wrong_mode".into(),
        }
    }

    #[test]
    fn test_event_serialises_with_dotted_type() {
        let json = serde_json::to_value(skipped()).unwrap();
        assert_eq!(json["type"], "file.skipped");
        assert_eq!(json["reason"], "wrong_mode");

        let back: RunEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, skipped());
    }

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(&skipped()).await;
        LoggingEventSink::default().emit(&skipped()).await;
        LoggingEventSink::new(Level::DEBUG).emit(&skipped()).await;
    }

    #[tokio::test]
    async fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(&skipped()).await;
        sink.emit(&RunEvent::RunAborted {
            run_id: Uuid::nil(),
            reason: "stop".into(),
        })
        .await;

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events_of_type("file.").len(), 1);
        assert_eq!(sink.events_of_type("run.").len(), 1);
        assert_eq!(sink.events()[0].event_type(), "file.skipped");
    }
}
