//! Run-level cancellation.
//!
//! Cancellation is cooperative: it stops the dispatch of files that have not
//! started yet and never interrupts a chain that is already running.

mod token;

pub use token::CancellationToken;
