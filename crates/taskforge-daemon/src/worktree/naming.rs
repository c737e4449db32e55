//! Deterministic branch naming.
//!
//! The branch name for a task is `{prefix}-{slug}` where the prefix depends
//! on the task type and the slug is derived from the title. Same (type,
//! title) always yields the same branch name, so worktree creation can be
//! retried idempotently.

use taskforge_core::TaskType;

/// Maximum slug length in characters.
const MAX_SLUG_LEN: usize = 50;

/// Branch prefix for a task type.
pub const fn branch_prefix(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Bug => "fix",
        TaskType::Feature | TaskType::Story | TaskType::Epic => "feat",
        TaskType::Task | TaskType::Subtask => "task",
    }
}

/// Turn free text into a branch-safe token: lowercase, non-alphanumeric runs
/// collapsed to single hyphens, trimmed, truncated to 50 characters.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_hyphen = true; // suppress a leading hyphen
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        slug = slug.chars().take(MAX_SLUG_LEN).collect();
    }
    slug.trim_matches('-').to_string()
}

/// Derive the worktree branch name for a task.
pub fn branch_name(task_type: TaskType, title: &str) -> String {
    format!("{}-{}", branch_prefix(task_type), slugify(title))
}
