//! Error types for RateQueue
//!
//! This module defines the error type shared by the ledger, the dispatch loop
//! and configuration loading. Uses `thiserror` for `Display` and `Error`
//! implementations.

use thiserror::Error;

/// The primary error type for RateQueue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Configuration errors (invalid thresholds, unreadable config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A submitted task did not have the required shape (empty id, non-idle status).
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// A submitted task reused an id that is already in the ledger.
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    /// A processor call failed or returned an unexpected record.
    #[error("Processor error: {0}")]
    Processor(String),

    /// Resource not found (task ids, prompt files, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized `Result` type for RateQueue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
