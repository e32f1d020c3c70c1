//! Stage trait and implementations.
//!
//! Stages are the units of per-file computation in a processing chain.

mod builtin;
mod registry;
mod result;

pub use builtin::{IdentifyFileStage, SkipOnModeStage};
pub use registry::{StageFactory, StageRegistry};
pub use result::StageResult;

use crate::context::{FieldContract, FileContext};
use crate::resources::ResourcePool;
use async_trait::async_trait;
use std::fmt::Debug;

/// Trait for chain stages.
///
/// One stage instance is shared by every worker of a run and may be applied
/// to different files concurrently, so implementations must not keep
/// per-file state in `self`.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the configuration name of the stage.
    fn name(&self) -> &str;

    /// Returns the fields this stage reads and writes.
    ///
    /// Checked against earlier stages when the chain is built.
    fn contract(&self) -> FieldContract {
        FieldContract::default()
    }

    /// Returns the names of the shared datasets this stage uses.
    fn resources(&self) -> Vec<String> {
        Vec::new()
    }

    /// Applies the stage to one file.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The file's context, exclusively owned for this call
    /// * `resources` - Read-only shared datasets
    async fn apply(&self, ctx: &mut FileContext, resources: &ResourcePool) -> StageResult;
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(&mut FileContext) -> StageResult + Send + Sync,
{
    name: String,
    contract: FieldContract,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&mut FileContext) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage with an empty contract.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            contract: FieldContract::default(),
            func,
        }
    }

    /// Sets the field contract.
    #[must_use]
    pub fn with_contract(mut self, contract: FieldContract) -> Self {
        self.contract = contract;
        self
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&mut FileContext) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("contract", &self.contract)
            .finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&mut FileContext) -> StageResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn contract(&self) -> FieldContract {
        self.contract.clone()
    }

    async fn apply(&self, ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        (self.func)(ctx)
    }
}

/// A stage that does nothing.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, _ctx: &mut FileContext, _resources: &ResourcePool) -> StageResult {
        StageResult::Continue
    }
}
