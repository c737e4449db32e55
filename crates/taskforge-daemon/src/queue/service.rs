//! Worktree queue service.
//!
//! The serialization point for per-worktree execution. Every mutating
//! operation takes the worktree's writer lock, so concurrent enqueue /
//! dequeue / mark calls can never interleave into a double-counted or
//! corrupted queue. `mark_running` is the enforcement point of the
//! at-most-one-running invariant.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use super::store::{QueueEntry, QueueEntryStatus, QueueStats, QueueStore};

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Another entry is already running on worktree {worktree}: {running_task}")]
    AlreadyRunning {
        worktree: String,
        running_task: String,
    },

    #[error("No queue entry for task {task_id} on worktree {worktree}")]
    EntryNotFound { worktree: String, task_id: String },

    #[error("Status {0:?} is not terminal")]
    NotTerminal(QueueEntryStatus),

    #[error("Queue persistence error: {0}")]
    Store(#[from] taskforge_core::Error),
}

/// Persisted per-worktree FIFO queues with single-writer discipline.
pub struct WorktreeQueueService {
    store: QueueStore,
    /// One writer lock per worktree name.
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    /// Wakeup handles for drivers waiting on queue changes.
    notifiers: RwLock<HashMap<String, Arc<Notify>>>,
}

impl WorktreeQueueService {
    pub fn new(queue_dir: PathBuf) -> Self {
        Self {
            store: QueueStore::new(queue_dir),
            locks: RwLock::new(HashMap::new()),
            notifiers: RwLock::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, worktree: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(worktree) {
            return Arc::clone(lock);
        }
        let mut locks = self.locks.write().await;
        Arc::clone(
            locks
                .entry(worktree.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Wakeup handle signalled on every enqueue and terminal transition for
    /// the worktree.
    pub async fn notifier(&self, worktree: &str) -> Arc<Notify> {
        if let Some(n) = self.notifiers.read().await.get(worktree) {
            return Arc::clone(n);
        }
        let mut notifiers = self.notifiers.write().await;
        Arc::clone(
            notifiers
                .entry(worktree.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    async fn notify(&self, worktree: &str) {
        self.notifier(worktree).await.notify_waiters();
    }

    /// Append a task to a worktree's queue.
    ///
    /// Returns the 0-based position among non-terminal entries (0 means the
    /// entry is next in line, or currently blocked only by a running entry).
    pub async fn enqueue(&self, worktree: &str, task_id: &str) -> Result<usize, QueueError> {
        let lock = self.lock_for(worktree).await;
        let _guard = lock.lock().await;

        let mut entries = self.store.load(worktree);
        let sequence = entries.iter().map(|e| e.sequence).max().unwrap_or(0) + 1;
        let position = entries
            .iter()
            .filter(|e| matches!(e.status, QueueEntryStatus::Queued))
            .count();
        entries.push(QueueEntry::new(task_id, worktree, sequence));
        self.store.save(worktree, &entries)?;
        drop(_guard);

        info!(worktree, task_id, sequence, position, "Enqueued task");
        self.notify(worktree).await;
        Ok(position)
    }

    /// Full queue contents ordered by sequence number.
    pub async fn load(&self, worktree: &str) -> Vec<QueueEntry> {
        let lock = self.lock_for(worktree).await;
        let _guard = lock.lock().await;
        self.store.load(worktree)
    }

    /// Counters over the queue.
    pub async fn stats(&self, worktree: &str) -> QueueStats {
        let entries = self.load(worktree).await;
        let mut stats = QueueStats::default();
        for entry in &entries {
            match entry.status {
                QueueEntryStatus::Queued => stats.queued += 1,
                QueueEntryStatus::Running => stats.running += 1,
                QueueEntryStatus::Completed => stats.completed += 1,
                QueueEntryStatus::Failed => stats.failed += 1,
                QueueEntryStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Next queued entry in strict sequence order, without claiming it.
    pub async fn dequeue(&self, worktree: &str) -> Option<QueueEntry> {
        let lock = self.lock_for(worktree).await;
        let _guard = lock.lock().await;
        self.store
            .load(worktree)
            .into_iter()
            .find(|e| matches!(e.status, QueueEntryStatus::Queued))
    }

    /// Transition a queued entry to running.
    ///
    /// Fails if another entry on the same worktree is already running.
    pub async fn mark_running(&self, worktree: &str, task_id: &str) -> Result<(), QueueError> {
        let lock = self.lock_for(worktree).await;
        let _guard = lock.lock().await;

        let mut entries = self.store.load(worktree);
        if let Some(running) = entries
            .iter()
            .find(|e| matches!(e.status, QueueEntryStatus::Running))
        {
            return Err(QueueError::AlreadyRunning {
                worktree: worktree.to_string(),
                running_task: running.task_id.clone(),
            });
        }

        let entry = entries
            .iter_mut()
            .find(|e| e.task_id == task_id && matches!(e.status, QueueEntryStatus::Queued))
            .ok_or_else(|| QueueError::EntryNotFound {
                worktree: worktree.to_string(),
                task_id: task_id.to_string(),
            })?;
        entry.status = QueueEntryStatus::Running;
        self.store.save(worktree, &entries)?;

        debug!(worktree, task_id, "Queue entry running");
        Ok(())
    }

    /// Transition a non-terminal entry to a terminal status.
    pub async fn mark_terminal(
        &self,
        worktree: &str,
        task_id: &str,
        status: QueueEntryStatus,
        error: Option<String>,
    ) -> Result<(), QueueError> {
        if !status.is_terminal() {
            return Err(QueueError::NotTerminal(status));
        }

        let lock = self.lock_for(worktree).await;
        let _guard = lock.lock().await;

        let mut entries = self.store.load(worktree);
        let entry = entries
            .iter_mut()
            .find(|e| e.task_id == task_id && !e.status.is_terminal())
            .ok_or_else(|| QueueError::EntryNotFound {
                worktree: worktree.to_string(),
                task_id: task_id.to_string(),
            })?;
        entry.status = status;
        entry.error = error;
        self.store.save(worktree, &entries)?;
        drop(_guard);

        info!(worktree, task_id, ?status, "Queue entry reached terminal status");
        self.notify(worktree).await;
        Ok(())
    }

    /// Requeue entries left running by a previous process.
    ///
    /// A running entry can only belong to the process that marked it; after
    /// a restart any persisted running entry is stale and would block its
    /// worktree forever. Returns the worktrees that have pending entries
    /// afterwards so callers can restart their drivers.
    pub async fn recover(&self) -> Vec<String> {
        let mut pending = Vec::new();
        for worktree in self.store.list_worktrees() {
            let lock = self.lock_for(&worktree).await;
            let guard = lock.lock().await;

            let mut entries = self.store.load(&worktree);
            let mut requeued = 0usize;
            for entry in entries
                .iter_mut()
                .filter(|e| matches!(e.status, QueueEntryStatus::Running))
            {
                entry.status = QueueEntryStatus::Queued;
                requeued += 1;
            }
            if requeued > 0 {
                if let Err(e) = self.store.save(&worktree, &entries) {
                    warn!(worktree, error = %e, "Failed to persist recovered queue");
                    continue;
                }
                warn!(worktree, requeued, "Requeued entries left running by a previous process");
            }
            let has_pending = entries
                .iter()
                .any(|e| matches!(e.status, QueueEntryStatus::Queued));
            drop(guard);

            if has_pending {
                self.notify(&worktree).await;
                pending.push(worktree);
            }
        }
        pending
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn service() -> (WorktreeQueueService, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let svc = WorktreeQueueService::new(dir.path().to_path_buf());
        (svc, dir)
    }

    #[tokio::test]
    async fn dequeue_follows_enqueue_order() {
        let (svc, _dir) = service();
        for id in ["a", "b", "c"] {
            svc.enqueue("feat-login", id).await.unwrap();
        }

        let first = svc.dequeue("feat-login").await.unwrap();
        assert_eq!(first.task_id, "a");
        svc.mark_running("feat-login", "a").await.unwrap();
        svc.mark_terminal("feat-login", "a", QueueEntryStatus::Completed, None)
            .await
            .unwrap();

        let second = svc.dequeue("feat-login").await.unwrap();
        assert_eq!(second.task_id, "b");
    }

    #[tokio::test]
    async fn sequence_numbers_break_timestamp_ties() {
        let (svc, _dir) = service();
        // All enqueued within the same wall-clock second
        for id in ["a", "b", "c", "d"] {
            svc.enqueue("feat-x", id).await.unwrap();
        }
        let entries = svc.load("feat-x").await;
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        let ids: Vec<&str> = entries.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn at_most_one_running_per_worktree() {
        let (svc, _dir) = service();
        svc.enqueue("feat-x", "a").await.unwrap();
        svc.enqueue("feat-x", "b").await.unwrap();

        svc.mark_running("feat-x", "a").await.unwrap();
        let err = svc.mark_running("feat-x", "b").await.unwrap_err();
        assert!(matches!(err, QueueError::AlreadyRunning { .. }));

        // Different worktree is unaffected
        svc.enqueue("fix-y", "c").await.unwrap();
        svc.mark_running("fix-y", "c").await.unwrap();
    }

    #[tokio::test]
    async fn stats_track_transitions() {
        let (svc, _dir) = service();
        for id in ["a", "b", "c"] {
            svc.enqueue("feat-login", id).await.unwrap();
        }
        let stats = svc.stats("feat-login").await;
        assert_eq!(stats.queued, 3);
        assert_eq!(stats.running, 0);

        svc.mark_running("feat-login", "a").await.unwrap();
        let stats = svc.stats("feat-login").await;
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.running, 1);

        svc.mark_terminal("feat-login", "a", QueueEntryStatus::Failed, Some("boom".into()))
            .await
            .unwrap();
        let stats = svc.stats("feat-login").await;
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.running, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn enqueue_reports_position() {
        let (svc, _dir) = service();
        assert_eq!(svc.enqueue("feat-x", "a").await.unwrap(), 0);
        assert_eq!(svc.enqueue("feat-x", "b").await.unwrap(), 1);
        svc.mark_running("feat-x", "a").await.unwrap();
        // Running entries no longer count toward queued position
        assert_eq!(svc.enqueue("feat-x", "c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_terminal_rejects_non_terminal_status() {
        let (svc, _dir) = service();
        svc.enqueue("feat-x", "a").await.unwrap();
        let err = svc
            .mark_terminal("feat-x", "a", QueueEntryStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::NotTerminal(_)));
    }

    #[tokio::test]
    async fn unknown_entry_errors() {
        let (svc, _dir) = service();
        let err = svc.mark_running("feat-x", "ghost").await.unwrap_err();
        assert!(matches!(err, QueueError::EntryNotFound { .. }));
    }

    #[tokio::test]
    async fn queue_survives_service_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let svc = WorktreeQueueService::new(dir.path().to_path_buf());
            svc.enqueue("feat-x", "a").await.unwrap();
            svc.enqueue("feat-x", "b").await.unwrap();
            svc.mark_running("feat-x", "a").await.unwrap();
        }
        let svc = WorktreeQueueService::new(dir.path().to_path_buf());
        let stats = svc.stats("feat-x").await;
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.running, 1);
        // Sequence continues past persisted entries
        svc.enqueue("feat-x", "c").await.unwrap();
        let entries = svc.load("feat-x").await;
        assert_eq!(entries.last().unwrap().sequence, 3);
    }

    #[tokio::test]
    async fn recover_requeues_stale_running_entries() {
        let dir = tempfile::tempdir().unwrap();
        {
            let svc = WorktreeQueueService::new(dir.path().to_path_buf());
            svc.enqueue("feat-x", "a").await.unwrap();
            svc.enqueue("feat-x", "b").await.unwrap();
            svc.mark_running("feat-x", "a").await.unwrap();
            svc.enqueue("fix-y", "c").await.unwrap();
            svc.mark_running("fix-y", "c").await.unwrap();
            svc.mark_terminal("fix-y", "c", QueueEntryStatus::Completed, None)
                .await
                .unwrap();
        }

        // New process: the running entry on feat-x is stale
        let svc = WorktreeQueueService::new(dir.path().to_path_buf());
        let pending = svc.recover().await;
        assert_eq!(pending, vec!["feat-x"]);

        let stats = svc.stats("feat-x").await;
        assert_eq!(stats.running, 0);
        assert_eq!(stats.queued, 2);
        // The requeued entry keeps its place at the head of the line
        assert_eq!(svc.dequeue("feat-x").await.unwrap().task_id, "a");
        svc.mark_running("feat-x", "a").await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_enqueues_never_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let svc = Arc::new(WorktreeQueueService::new(dir.path().to_path_buf()));

        let mut handles = Vec::new();
        for i in 0..20 {
            let svc = Arc::clone(&svc);
            handles.push(tokio::spawn(async move {
                svc.enqueue("feat-x", &format!("t-{i}")).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let entries = svc.load("feat-x").await;
        assert_eq!(entries.len(), 20);
        // Sequence numbers are unique and dense
        let mut sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (1..=20).collect::<Vec<u64>>());
    }
}
