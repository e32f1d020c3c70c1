//! Context status and terminal outcomes.

use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure details attached to a failed outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Error kind (see [`StageError::kind`]).
    pub kind: String,
    /// Error message.
    pub message: String,
}

impl FailureRecord {
    /// Creates a failure record.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<&StageError> for FailureRecord {
    fn from(err: &StageError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Terminal classification of one file's run through the chain.
///
/// Read-only once attached to a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Every enabled stage returned `Continue`.
    Completed,
    /// A stage decided the file does not qualify for output.
    SkippedAtStage {
        /// The stage that skipped the file.
        stage: String,
        /// Why the file was skipped.
        reason: String,
    },
    /// A stage failed unexpectedly.
    Failed {
        /// The stage that failed.
        stage: String,
        /// The failure.
        error: FailureRecord,
    },
}

impl Outcome {
    /// Creates a skipped outcome.
    #[must_use]
    pub fn skipped(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SkippedAtStage {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Creates a failed outcome from a stage error.
    #[must_use]
    pub fn failed(stage: impl Into<String>, error: &StageError) -> Self {
        Self::Failed {
            stage: stage.into(),
            error: error.into(),
        }
    }

    /// Returns true for `Completed`.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for `SkippedAtStage`.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::SkippedAtStage { .. })
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the stage that ended the chain early, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Completed => None,
            Self::SkippedAtStage { stage, .. } | Self::Failed { stage, .. } => Some(stage),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::SkippedAtStage { stage, reason } => write!(f, "skipped at {stage}: {reason}"),
            Self::Failed { stage, error } => {
                write!(f, "failed at {stage} [{}]: {}", error.kind, error.message)
            }
        }
    }
}

/// Lifecycle status of a per-file context.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ContextStatus {
    /// The chain is still running stages.
    #[default]
    Running,
    /// The file was skipped.
    Skipped(String),
    /// The file failed.
    Failed(String),
    /// All stages completed.
    Completed,
}

impl ContextStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl From<&Outcome> for ContextStatus {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Completed => Self::Completed,
            Outcome::SkippedAtStage { reason, .. } => Self::Skipped(reason.clone()),
            Outcome::Failed { error, .. } => Self::Failed(error.message.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(Outcome::Completed.is_completed());
        assert!(Outcome::skipped("alg_skip_on_mode", "wrong_mode").is_skipped());

        let failed = Outcome::failed("alg_retrack", &StageError::Numerical("nan range".into()));
        assert!(failed.is_failed());
        assert_eq!(failed.stage(), Some("alg_retrack"));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = Outcome::skipped("alg_skip_on_mode", "wrong_mode");
        assert_eq!(outcome.to_string(), "skipped at alg_skip_on_mode: wrong_mode");
    }

    #[test]
    fn test_outcome_serialize() {
        let json = serde_json::to_value(Outcome::skipped("a", "b")).unwrap();
        assert_eq!(json["status"], "skipped_at_stage");
        assert_eq!(json["stage"], "a");
    }

    #[test]
    fn test_context_status_terminal() {
        assert!(!ContextStatus::Running.is_terminal());
        assert!(ContextStatus::Completed.is_terminal());
        assert_eq!(
            ContextStatus::from(&Outcome::skipped("a", "no_ice")),
            ContextStatus::Skipped("no_ice".into())
        );
    }
}
