//! Orchestration request/response types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Options for one execution, passed through from the caller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    pub capture_screenshots: bool,
    pub capture_video: bool,
    pub create_documentation: bool,
    pub dry_run: bool,
    pub skip_tests: bool,
    pub skip_demo: bool,
}

/// Request to start work on a task.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub task_id: String,
    pub user_id: String,
    pub options: ExecutionOptions,
}

/// Phase of an execution, coarser than task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Initializing,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionPhase {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Immediate acknowledgment returned by `start`.
#[derive(Debug, Clone, Serialize)]
pub struct StartAck {
    /// Execution id; callers use it for status/stop and as the session key.
    pub execution_id: String,
    pub phase: ExecutionPhase,
    /// 0-based position among queued entries for the worktree.
    pub queue_position: usize,
    pub worktree: String,
}

/// Final outcome of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub log_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshots_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of an execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSnapshot {
    pub execution_id: String,
    pub task_id: String,
    pub user_id: String,
    pub worktree: String,
    pub phase: ExecutionPhase,
    /// Heuristic progress, 0..=95 while running; 100 only on completion.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub started_at: i64,
}
