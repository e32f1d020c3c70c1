//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events and spans; binaries call
//! [`init_tracing`] once to install a subscriber.

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Error raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingInitError {
    /// The level or filter directive could not be parsed.
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber is already installed.
    #[error("Tracing already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Installs a global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set. With `json` the
/// output is one JSON object per line, carrying the run and file span
/// fields.
///
/// # Errors
///
/// Returns `TracingInitError` if `level` is not a valid filter or a
/// subscriber is already installed.
pub fn init_tracing(level: &str, json: bool) -> Result<(), TracingInitError> {
    let filter = build_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry.with(fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    result.map_err(|e| TracingInitError::AlreadyInitialised(e.to_string()))
}

fn build_filter(level: &str) -> Result<EnvFilter, TracingInitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| TracingInitError::InvalidFilter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}
