//! Testing utilities for processing chains.
//!
//! This module provides:
//! - Mock stages that record, skip, fail, write fields or touch resources
//! - A product writer that panics on selected files
//! - A static file selector

mod mocks;

pub use mocks::{
    CallLog, FailingStage, FieldWriterStage, PanickingProductWriter, RecordingStage, ResourceReaderStage,
    SkippingStage, SlowStage, StaticSelector,
};
