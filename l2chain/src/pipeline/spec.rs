//! Stage descriptors: the static, configured shape of a chain.

use crate::context::FieldContract;
use crate::stages::Stage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name, enable flag and position of one configured stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// The stage's configuration name.
    pub name: String,
    /// Whether the stage is part of the effective chain.
    pub enabled: bool,
    /// Position in the configured list, counting disabled stages.
    pub ordinal: usize,
}

/// A configured stage together with its implementation.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// Static descriptor.
    pub descriptor: StageDescriptor,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// The contract captured when the chain was built.
    pub contract: Arc<FieldContract>,
}

impl StageSpec {
    /// Creates a spec, capturing the stage's contract.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>, enabled: bool, ordinal: usize) -> Self {
        let contract = Arc::new(runner.contract());
        Self {
            descriptor: StageDescriptor {
                name: runner.name().to_string(),
                enabled,
                ordinal,
            },
            runner,
            contract,
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}
