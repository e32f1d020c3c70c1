//! Shared Resource Pool: large read-only reference datasets.
//!
//! This module provides:
//! - The pool itself, loading each dataset at most once per run
//! - Loader trait and the built-in JSON and closure loaders
//! - Built-in dataset types (raster grids and uncertainty tables)

mod datasets;
mod loaders;
mod pool;

pub use datasets::{Dataset, RasterGrid, UncertaintyTable};
pub use loaders::{DatasetKind, FnLoader, JsonDatasetLoader, ResourceLoader};
pub use pool::{ResourcePool, ResourcePoolBuilder, SharedDataset};
