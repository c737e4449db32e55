//! Git worktree management.
//!
//! Each task executes inside its own worktree so parallel agents never touch
//! the same checked-out files. Branch names are a pure function of the task
//! type and title, which makes worktree creation idempotent across retries.

pub mod manager;
pub mod naming;
pub mod stats;

pub use manager::{CreateOptions, Worktree, WorktreeError, WorktreeManager};
pub use naming::{branch_name, slugify};
pub use stats::RepoActivity;
