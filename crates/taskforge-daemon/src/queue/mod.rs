//! Per-worktree persisted FIFO queues.
//!
//! Each worktree owns one JSON queue file. All mutation goes through
//! [`WorktreeQueueService`], which serializes access per worktree and
//! enforces the at-most-one-running invariant.

pub mod service;
pub mod store;

pub use service::{QueueError, WorktreeQueueService};
pub use store::{QueueEntry, QueueEntryStatus, QueueStats, QueueStore};
