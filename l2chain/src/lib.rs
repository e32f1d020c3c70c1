//! # l2chain
//!
//! A configurable processing chain turning radar altimeter Level-1b track
//! files into Level-2 products.
//!
//! l2chain provides:
//!
//! - **Stage chains**: ordered, enable/disable-able algorithm stages with
//!   declared field contracts checked before a run starts
//! - **Per-file contexts**: a typed field store owned by one worker
//! - **Shared resources**: reference datasets loaded once and shared by all
//!   workers
//! - **File selectors**: date-range discovery of CryoSat-2 L1b files
//! - **Orchestration**: bounded concurrent execution with per-file outcomes
//!   and a run summary
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use l2chain::prelude::*;
//!
//! let config = ChainConfig::from_file("chain.yml")?;
//! let orchestrator = config
//!     .orchestrator(&StageRegistry::with_builtins())?
//!     .event_sink(Arc::new(LoggingEventSink::default()))
//!     .build()?;
//!
//! let summary = orchestrator.run(&SelectorQuery::day(date)).await?;
//! println!("{summary}");
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod output;
pub mod pipeline;
pub mod resources;
pub mod selectors;
pub mod stages;
pub mod testing;

pub use config::ChainConfig;
pub use errors::RunError;
pub use pipeline::{Orchestrator, RunSummary};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ChainConfig, Toggle};
    pub use crate::context::{FieldContract, FieldValue, FileContext, RunIdentity};
    pub use crate::core::{FileId, InstrumentMode, Outcome};
    pub use crate::errors::{
        ChainValidationError, ConfigError, FieldError, ResourceLoadError, RunError, SelectorError,
        StageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RunEvent};
    pub use crate::output::{JsonProductWriter, NoOpProductWriter, ProductWriter};
    pub use crate::pipeline::{
        ChainBuilder, FileReport, Orchestrator, OrchestratorBuilder, RunPolicy, RunSummary, StageChain,
    };
    pub use crate::resources::{DatasetKind, RasterGrid, ResourcePool, UncertaintyTable};
    pub use crate::selectors::{CryoSatFileSelector, FileSelector, SelectorQuery};
    pub use crate::stages::{FnStage, Stage, StageRegistry, StageResult};
    pub use std::sync::Arc;
}
