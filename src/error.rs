//! Error types for sweepstore.
//!
//! Every failure surfaces to the caller; nothing is retried or swallowed
//! (the single exception, a missing field during result aggregation, is
//! handled inside the aggregation itself and never reaches this enum).

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sweepstore error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or ambiguous encoded document
    #[error("Format error: {0}")]
    Format(String),

    /// Multiple on-disk candidates where exactly one is required
    #[error("Ambiguity error: {0}")]
    Ambiguity(String),

    /// A loaded id disagrees with the id the caller supplied
    #[error("Identity mismatch: file {} records id {found}, expected {expected}", .file.display())]
    Identity {
        /// Id the caller supplied
        expected: String,
        /// Id recorded in the loaded file
        found: String,
        /// File the id was loaded from
        file: PathBuf,
    },

    /// A lock marker is already present
    #[error("Resource busy: lock file {} already exists\nIf no other process is holding it, remove the stale lock file manually", .lock.display())]
    ResourceBusy {
        /// Path of the existing lock marker
        lock: PathBuf,
    },

    /// Read-back verification after a storage transition disagrees
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Unsupported or inconsistent configuration value
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation invalid in the current storage state
    #[error("{0}")]
    State(String),

    /// A path segment or registry tag did not resolve
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Primitive token (de)serialization error
    #[error("Token error: {0}")]
    Json(#[from] serde_json::Error),
}
