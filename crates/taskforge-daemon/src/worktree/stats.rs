//! Repository activity signals for progress estimation.
//!
//! Commit and changed-file counts since the base branch, gathered with git
//! subprocess calls inside the worktree. Failures are absorbed: the progress
//! estimator falls back to its time-only component.

use std::path::Path;

use tracing::warn;

/// Activity observed in a worktree since its base branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoActivity {
    /// Commits on the worktree branch not on the base branch.
    pub commits: u64,
    /// Files changed relative to the merge base.
    pub files_changed: u64,
}

/// Measure activity in `worktree_path` relative to `base_branch`.
///
/// Returns `None` when either git call fails (missing base branch, detached
/// state, git not installed). Never fatal.
pub async fn repo_activity(worktree_path: &Path, base_branch: &str) -> Option<RepoActivity> {
    let commits = count_output(
        worktree_path,
        &["rev-list", "--count", &format!("{base_branch}..HEAD")],
    )
    .await?;
    let files_changed = line_count_output(
        worktree_path,
        &["diff", "--name-only", &format!("{base_branch}...HEAD")],
    )
    .await?;
    Some(RepoActivity {
        commits,
        files_changed,
    })
}

async fn run_git(worktree_path: &Path, args: &[&str]) -> Option<String> {
    let output = match tokio::process::Command::new("git")
        .args(args)
        .current_dir(worktree_path)
        .output()
        .await
    {
        Ok(out) => out,
        Err(e) => {
            warn!(error = %e, "git invocation failed, skipping repo activity");
            return None;
        }
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            args = ?args,
            error = %stderr.trim(),
            "git command failed, skipping repo activity"
        );
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

async fn count_output(worktree_path: &Path, args: &[&str]) -> Option<u64> {
    let stdout = run_git(worktree_path, args).await?;
    match stdout.trim().parse() {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "unparseable git count output");
            None
        }
    }
}

async fn line_count_output(worktree_path: &Path, args: &[&str]) -> Option<u64> {
    let stdout = run_git(worktree_path, args).await?;
    Some(stdout.lines().filter(|l| !l.trim().is_empty()).count() as u64)
}
