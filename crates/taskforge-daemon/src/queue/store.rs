//! Queue file persistence.
//!
//! One JSON file per worktree under the queue directory, replaced atomically
//! on every write. A missing or malformed file reads as an empty queue with
//! a warning; queue corruption is never fatal.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use taskforge_core::store::{atomic_write_json, read_json};
use taskforge_core::task::now_unix;

/// Status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueEntryStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl QueueEntryStatus {
    /// Whether this status ends the entry's lifecycle.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One queued execution for a worktree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task_id: String,
    pub worktree: String,
    /// Monotonic per-worktree sequence number; the FIFO tiebreak. Wall-clock
    /// timestamps are informational only.
    pub sequence: u64,
    pub enqueued_at: i64,
    pub status: QueueEntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueEntry {
    pub fn new(task_id: impl Into<String>, worktree: impl Into<String>, sequence: u64) -> Self {
        Self {
            task_id: task_id.into(),
            worktree: worktree.into(),
            sequence,
            enqueued_at: now_unix(),
            status: QueueEntryStatus::Queued,
            error: None,
        }
    }
}

/// Counters over a worktree's queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// File-backed queue storage, one file per worktree.
#[derive(Debug, Clone)]
pub struct QueueStore {
    dir: PathBuf,
}

impl QueueStore {
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn queue_path(&self, worktree: &str) -> PathBuf {
        // Worktree names come from branch naming and validation; slashes are
        // flattened so the file always lands directly in the queue dir.
        let file = worktree.replace('/', "_");
        self.dir.join(format!("{file}.json"))
    }

    /// Load a worktree's queue, sorted by sequence number.
    ///
    /// Missing file means an empty queue. A malformed file is logged and
    /// also treated as empty rather than propagating the error.
    pub fn load(&self, worktree: &str) -> Vec<QueueEntry> {
        let path = self.queue_path(worktree);
        if !path.exists() {
            return Vec::new();
        }
        match read_json::<Vec<QueueEntry>>(&path) {
            Ok(mut entries) => {
                entries.sort_by_key(|e| e.sequence);
                entries
            }
            Err(e) => {
                warn!(
                    worktree,
                    path = %path.display(),
                    error = %e,
                    "Queue file malformed, reinitializing as empty"
                );
                Vec::new()
            }
        }
    }

    /// Atomically replace a worktree's queue file.
    pub fn save(&self, worktree: &str, entries: &[QueueEntry]) -> taskforge_core::Result<()> {
        atomic_write_json(&self.queue_path(worktree), &entries)
    }

    /// Worktree names with a persisted queue file.
    ///
    /// File names flatten slashes, so the name is read from the entries
    /// themselves. Empty and malformed files are skipped.
    pub fn list_worktrees(&self) -> Vec<String> {
        let Ok(dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names = Vec::new();
        for file in dir.flatten() {
            let path = file.path();
            if path.extension() != Some(std::ffi::OsStr::new("json")) {
                continue;
            }
            match read_json::<Vec<QueueEntry>>(&path) {
                Ok(entries) => {
                    if let Some(first) = entries.first() {
                        names.push(first.worktree.clone());
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed queue file");
                }
            }
        }
        names
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path().to_path_buf());
        assert!(store.load("feat-x").is_empty());
    }

    #[test]
    fn save_load_round_trip_sorted_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path().to_path_buf());

        let entries = vec![
            QueueEntry::new("t-2", "feat-x", 2),
            QueueEntry::new("t-1", "feat-x", 1),
        ];
        store.save("feat-x", &entries).unwrap();

        let loaded = store.load("feat-x");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].task_id, "t-1");
        assert_eq!(loaded[1].task_id, "t-2");
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join("feat-x.json"), "{not json").unwrap();
        assert!(store.load("feat-x").is_empty());
    }

    #[test]
    fn list_worktrees_reads_names_from_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path().to_path_buf());
        store
            .save("feat-x", &[QueueEntry::new("t-1", "feat-x", 1)])
            .unwrap();
        store
            .save("fix/y", &[QueueEntry::new("t-2", "fix/y", 1)])
            .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let mut names = store.list_worktrees();
        names.sort();
        assert_eq!(names, vec!["feat-x", "fix/y"]);
    }

    #[test]
    fn slashed_worktree_names_stay_in_queue_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = QueueStore::new(dir.path().to_path_buf());
        store
            .save("feat/login", &[QueueEntry::new("t-1", "feat/login", 1)])
            .unwrap();
        assert!(dir.path().join("feat_login.json").exists());
        assert_eq!(store.load("feat/login").len(), 1);
    }
}
