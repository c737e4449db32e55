//! Session types and errors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Outbound event on a session's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A chunk of process stdout.
    Output { data: String },
    /// A chunk of process stderr.
    ErrorMsg { data: String },
    /// Process exit; always the final event for a session.
    Close { exit_code: i32 },
}

/// Inbound message for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionInput {
    /// Data for the process's stdin.
    Input { data: String },
    /// Interrupt the process without ending the session.
    Interrupt,
}

/// Snapshot of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub working_dir: PathBuf,
    pub created_at: i64,
    /// Seconds since the last observed input/output activity.
    pub idle_secs: u64,
}

/// Errors from session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session pool exhausted ({current}/{max})")]
    PoolExhausted { current: usize, max: usize },

    #[error("Failed to spawn agent process: {reason}")]
    SpawnFailed { reason: String },

    #[error("Session process already exited: {id}")]
    ProcessExited { id: String },

    #[error("Signal delivery failed: {0}")]
    Signal(#[from] std::io::Error),
}
