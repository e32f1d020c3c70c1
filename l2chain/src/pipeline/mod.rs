//! Chain building and execution.
//!
//! This module provides:
//! - Stage descriptors and the validating chain builder
//! - The stage chain runner
//! - Run policies and run summaries
//! - The orchestrator that drives a chain over many files

mod builder;
mod chain;
mod orchestrator;
mod policy;
mod spec;
mod summary;

pub use builder::ChainBuilder;
pub use chain::StageChain;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use policy::RunPolicy;
pub use spec::{StageDescriptor, StageSpec};
pub use summary::{FileReport, RunSummary};
