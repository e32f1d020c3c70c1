//! Declared field reads and writes of a stage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The fields a stage requires, may use, and produces.
///
/// Chains are validated against these declarations before any file runs:
/// every required read must be written by an earlier enabled stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldContract {
    /// Fields that must be present when the stage runs.
    #[serde(default)]
    pub reads: BTreeSet<String>,
    /// Fields the stage uses when present.
    #[serde(default)]
    pub optional_reads: BTreeSet<String>,
    /// Fields the stage writes.
    #[serde(default)]
    pub writes: BTreeSet<String>,
}

impl FieldContract {
    /// Creates an empty contract.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds required reads.
    #[must_use]
    pub fn reads(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reads.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds optional reads.
    #[must_use]
    pub fn optional_reads(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.optional_reads.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Adds writes.
    #[must_use]
    pub fn writes(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.writes.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Returns true if the stage may read `key`.
    ///
    /// A stage may always read back what it declares it writes.
    #[must_use]
    pub fn allows_read(&self, key: &str) -> bool {
        self.reads.contains(key) || self.optional_reads.contains(key) || self.writes.contains(key)
    }

    /// Returns true if the stage may write `key`.
    #[must_use]
    pub fn allows_write(&self, key: &str) -> bool {
        self.writes.contains(key)
    }
}
