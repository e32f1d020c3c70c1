//! Per-file context and the typed field store passed between stages.
//!
//! This module provides:
//! - A typed union of field values with writer tracking
//! - Field contracts declaring what a stage reads and writes
//! - The per-file context owned by one worker for the life of its chain
//! - Run identity used to correlate logs and summaries

mod contract;
mod fields;
mod file_context;
mod identity;

pub use contract::FieldContract;
pub use fields::{FieldEntry, FieldStore, FieldValue};
pub use file_context::FileContext;
pub use identity::RunIdentity;
