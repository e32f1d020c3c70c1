//! Error types for the processing chain.
//!
//! Errors are split by blast radius:
//!
//! - [`StageError`] and [`FieldError`] are file-level: they end processing of
//!   one file and become an `Outcome::Failed`.
//! - [`ResourceLoadError`] and [`SelectorError`] are run-level: every file
//!   would fail the same way, so they terminate the run.
//! - [`ChainValidationError`] and [`ConfigError`] are raised before a run
//!   starts.
//!
//! [`RunError`] is the umbrella returned by the orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Run-level error returned by the orchestrator.
///
/// A run that returns `Ok` may still contain failed files; a `RunError`
/// means the run itself could not complete.
#[derive(Debug, Error)]
pub enum RunError {
    /// A shared reference dataset failed to load.
    #[error("{0}")]
    ResourceLoad(#[from] ResourceLoadError),

    /// A file selector could not reach its source.
    #[error("{0}")]
    Selector(#[from] SelectorError),

    /// The chain configuration is invalid.
    #[error("{0}")]
    Validation(#[from] ChainValidationError),

    /// The configuration file could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An unexpected internal error (e.g. a worker task could not be joined).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunError {
    /// Short machine-readable kind, used in logs and event payloads.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResourceLoad(_) => "resource_load",
            Self::Selector(_) => "selector",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Metadata about a chain contract violation for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "CHAIN-MISSING-FIELD").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when an effective stage chain fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ChainValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl ChainValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>, error_info: ContractErrorInfo) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Returns the contract error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.error_info.code
    }
}

/// Error raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The configuration could not be parsed.
    #[error("Cannot parse config: {0}")]
    Parse(String),

    /// A configuration value is invalid.
    #[error("Invalid config value for '{key}': {reason}")]
    Invalid {
        /// Offending key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A stage or selector name has no registered implementation.
    #[error("Unknown {what} '{name}'")]
    Unknown {
        /// "stage" or "file selector".
        what: &'static str,
        /// The unregistered name.
        name: String,
    },
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Error raised when a shared reference dataset cannot be provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceLoadError {
    /// No loader is registered under this name.
    #[error("Unknown resource '{name}'")]
    Unknown {
        /// Logical dataset name.
        name: String,
    },

    /// The dataset source does not exist.
    #[error("Resource '{name}' not found at {}", path.display())]
    NotFound {
        /// Logical dataset name.
        name: String,
        /// Resolved source path.
        path: PathBuf,
    },

    /// The dataset source exists but could not be read or decoded.
    #[error("Resource '{name}' failed to load: {reason}")]
    Failed {
        /// Logical dataset name.
        name: String,
        /// Failure description.
        reason: String,
    },

    /// The dataset was requested as a different type than the one loaded.
    #[error("Resource '{name}' is not a {expected}")]
    TypeMismatch {
        /// Logical dataset name.
        name: String,
        /// Requested type name.
        expected: &'static str,
    },
}

impl ResourceLoadError {
    /// Creates a load failure.
    #[must_use]
    pub fn failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the logical dataset name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Unknown { name }
            | Self::NotFound { name, .. }
            | Self::Failed { name, .. }
            | Self::TypeMismatch { name, .. } => name,
        }
    }
}

/// Error raised by a file selector.
///
/// "No matching files" is not an error: selectors return an empty list.
#[derive(Debug, Clone, Error)]
pub enum SelectorError {
    /// The selector's source directory cannot be accessed.
    #[error("File selector '{selector}' cannot access {}: {reason}", path.display())]
    SourceUnreachable {
        /// Selector name.
        selector: String,
        /// Directory that could not be accessed.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The query cannot be satisfied (e.g. end date before start date).
    #[error("Invalid query for file selector '{selector}': {reason}")]
    InvalidQuery {
        /// Selector name.
        selector: String,
        /// What is wrong with the query.
        reason: String,
    },
}

/// Error raised when a stage accesses a context field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The field has not been written.
    #[error("Field '{key}' is not present")]
    Missing {
        /// The field name.
        key: String,
    },

    /// The field holds a different variant than requested.
    #[error("Field '{key}' is a {actual}, expected {expected}")]
    TypeMismatch {
        /// The field name.
        key: String,
        /// Requested variant.
        expected: &'static str,
        /// Stored variant.
        actual: &'static str,
    },

    /// A stage read a field it did not declare.
    #[error("Undeclared read: stage '{stage}' read '{key}' which is not in its field contract")]
    UndeclaredRead {
        /// The reading stage.
        stage: String,
        /// The field name.
        key: String,
    },

    /// A stage wrote a field it did not declare.
    #[error("Undeclared write: stage '{stage}' wrote '{key}' which is not in its field contract")]
    UndeclaredWrite {
        /// The writing stage.
        stage: String,
        /// The field name.
        key: String,
    },
}

/// Error returned by a stage for one file.
///
/// Everything except [`StageError::Resource`] is isolated to the file being
/// processed.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    /// The input file is malformed or lacks required content.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An IO error while reading the input.
    #[error("IO error: {0}")]
    Io(String),

    /// A numerical invariant was violated.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// A context field access failed.
    #[error("{0}")]
    Field(#[from] FieldError),

    /// A shared dataset could not be provided. Fatal to the run.
    #[error("{0}")]
    Resource(#[from] ResourceLoadError),

    /// The stage panicked.
    #[error("Stage panicked: {0}")]
    Panicked(String),

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl StageError {
    /// Short machine-readable kind used to group failures in the run summary.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Io(_) => "io",
            Self::Numerical(_) => "numerical",
            Self::Field(_) => "field",
            Self::Resource(_) => "resource",
            Self::Panicked(_) => "panic",
            Self::Other(_) => "other",
        }
    }

    /// Returns true if the error must terminate the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Resource(_))
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
