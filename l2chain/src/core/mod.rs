//! Core domain model types.
//!
//! This module contains the fundamental types used throughout the chain:
//! - Instrument modes and input file identifiers
//! - Per-file context status and terminal outcomes

mod mode;
mod status;

pub use mode::{FileId, InstrumentMode};
pub use status::{ContextStatus, FailureRecord, Outcome};
