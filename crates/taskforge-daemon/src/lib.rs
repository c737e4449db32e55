//! `TaskForge` Daemon Library
//!
//! Core functionality for the `TaskForge` daemon:
//! - Git worktree management, one isolated checkout per task branch
//! - Agent session supervision (subprocess lifecycle + I/O bridging)
//! - Persisted per-worktree FIFO queues
//! - Heuristic progress estimation
//! - Execution orchestration and the per-user agent registry

pub mod orchestration;
pub mod progress;
pub mod queue;
pub mod session;
pub mod worktree;
