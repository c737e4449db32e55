//! Error types for the `TaskForge` core library.

use thiserror::Error;

/// Result type alias using `TaskForge` core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `TaskForge` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Task not found in the store.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Task is in the wrong state for the requested operation.
    #[error("Invalid task state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
