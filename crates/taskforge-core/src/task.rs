//! Task domain model.
//!
//! Tasks are owned by the task store; the daemon reads them, drives their
//! status through the execution lifecycle, and writes status transitions
//! back. Everything here is plain data with serde round-tripping.

use serde::{Deserialize, Serialize};

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Generic task.
    #[default]
    Task,
    Bug,
    Feature,
    Subtask,
    Story,
    Epic,
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Planned and eligible for execution.
    #[default]
    Planned,
    /// Waiting for its turn on a worktree queue.
    Queued,
    /// An agent session is actively working on it.
    InProgress,
    /// Execution finished, awaiting human review.
    InReview,
    /// Accepted and closed.
    Done,
    /// Failed repeatedly; parked for operator attention.
    Deferred,
    /// Cancelled by an operator.
    Cancelled,
}

impl TaskStatus {
    /// Whether the status is terminal (no further execution expected).
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Deferred | Self::Cancelled)
    }
}

/// Estimated-effort bucket for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EffortBucket {
    Xs,
    S,
    #[default]
    M,
    L,
    Xl,
    Xxl,
}

/// Lifecycle status of a task's worktree association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    /// Worktree requested but not yet created on disk.
    Pending,
    /// Worktree exists and is checked out.
    Active,
    /// Worktree has been removed.
    Removed,
}

/// A unit of work tracked by the task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub task_type: TaskType,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: u8,
    #[serde(default)]
    pub effort: EffortBucket,
    /// Derived worktree branch name, set when execution first starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_status: Option<WorktreeStatus>,
    /// Number of execution attempts so far (drives the retry cutoff).
    #[serde(default)]
    pub attempts: u32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Create a new planned task.
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        title: impl Into<String>,
        task_type: TaskType,
    ) -> Self {
        let now = now_unix();
        Self {
            id: id.into(),
            project_id: project_id.into(),
            title: title.into(),
            description: String::new(),
            task_type,
            status: TaskStatus::Planned,
            priority: 0,
            effort: EffortBucket::default(),
            worktree_name: None,
            worktree_path: None,
            worktree_status: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task currently has a non-terminal worktree association.
    pub fn has_live_worktree(&self) -> bool {
        self.worktree_name.is_some()
            && !matches!(self.worktree_status, Some(WorktreeStatus::Removed) | None)
    }

    /// Update the `updated_at` timestamp.
    pub fn touch(&mut self) {
        self.updated_at = now_unix();
    }
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    #[allow(clippy::cast_possible_wrap)]
    {
        now.as_secs() as i64
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_task_is_planned() {
        let task = Task::new("t-1", "proj", "Fix login bug", TaskType::Bug);
        assert_eq!(task.status, TaskStatus::Planned);
        assert_eq!(task.attempts, 0);
        assert!(task.worktree_name.is_none());
        assert!(!task.has_live_worktree());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Deferred.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Planned.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::InReview.is_terminal());
    }

    #[test]
    fn live_worktree_requires_non_removed_status() {
        let mut task = Task::new("t-1", "proj", "Add search", TaskType::Feature);
        task.worktree_name = Some("feat-add-search".to_string());
        assert!(!task.has_live_worktree(), "no status yet means not live");

        task.worktree_status = Some(WorktreeStatus::Active);
        assert!(task.has_live_worktree());

        task.worktree_status = Some(WorktreeStatus::Removed);
        assert!(!task.has_live_worktree());
    }

    #[test]
    fn serde_round_trip_snake_case() {
        let task = Task::new("t-1", "proj", "Ship it", TaskType::Story);
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"task_type\":\"story\""));
        assert!(json.contains("\"status\":\"planned\""));

        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "t-1");
        assert_eq!(back.task_type, TaskType::Story);
    }

    #[test]
    fn now_unix_is_reasonable() {
        // Should be after 2020
        assert!(now_unix() > 1_577_836_800);
    }
}
