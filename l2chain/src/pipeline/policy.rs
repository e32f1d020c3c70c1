//! Run policy: what a failed file means for the rest of the run.

use serde::{Deserialize, Serialize};

/// How the orchestrator reacts to a `Failed` outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Record the failure and keep dispatching files (default).
    #[default]
    ContinueOnFileFailure,
    /// Stop dispatching new files after the first failure. Files already
    /// running finish normally.
    AbortOnFirstFailure,
}

impl RunPolicy {
    /// Maps the `stop_on_error` configuration flag to a policy.
    #[must_use]
    pub fn from_stop_on_error(stop_on_error: bool) -> Self {
        if stop_on_error {
            Self::AbortOnFirstFailure
        } else {
            Self::ContinueOnFileFailure
        }
    }

    /// Returns true if a failed file stops dispatch.
    #[must_use]
    pub fn aborts_on_failure(self) -> bool {
        matches!(self, Self::AbortOnFirstFailure)
    }
}

impl std::fmt::Display for RunPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContinueOnFileFailure => write!(f, "continue_on_file_failure"),
            Self::AbortOnFirstFailure => write!(f, "abort_on_first_failure"),
        }
    }
}
