//! Error types for batch-level failures.
//!
//! Per-item problems (a bad sidecar, an unreadable photo, a failed upload)
//! are never reported through [`Error`]; they are recorded as outcomes in the
//! run report instead.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for operations that can abort a whole run.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that stop a run before or between phases.
#[derive(Error, Debug)]
pub enum Error {
    /// Walking the source tree failed
    #[error("failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Missing or invalid run options
    #[error("invalid configuration: {0}")]
    Config(String),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
