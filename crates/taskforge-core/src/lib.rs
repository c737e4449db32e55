//! `TaskForge` Core Library
//!
//! Shared building blocks for the `TaskForge` daemon:
//! - Task domain model (types, statuses, effort buckets)
//! - Task store boundary (trait + file-backed reference implementation)
//! - Hierarchical configuration resolution
//! - Tracing initialization

pub mod config;
pub mod error;
pub mod store;
pub mod task;
pub mod tracing_init;

pub use error::{Error, Result};
pub use store::{FileTaskStore, TaskStore};
pub use task::{EffortBucket, Task, TaskStatus, TaskType, WorktreeStatus};
