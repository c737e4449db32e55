//! Worktree manager: git worktree add/list/remove.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use taskforge_core::TaskType;

use super::naming::branch_name;

/// Errors from worktree operations.
#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("Git command failed: {0}")]
    Git(String),

    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Worktree not found: {0}")]
    NotFound(String),

    #[error("Branch already checked out elsewhere: {branch} at {path}")]
    Conflict { branch: String, path: String },

    #[error("Branch already exists: {0} (pass attach_existing to reuse it)")]
    BranchExists(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A checked-out worktree as reported by git.
#[derive(Debug, Clone)]
pub struct Worktree {
    /// Branch name, which doubles as the worktree name.
    pub name: String,
    /// Filesystem path of the checkout.
    pub path: PathBuf,
    /// Owning repository path.
    pub repo_path: PathBuf,
}

/// Options for worktree creation.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Branch to fork from when creating a new branch.
    pub base_branch: Option<String>,
    /// Reuse an existing branch instead of failing with `BranchExists`.
    pub attach_existing: bool,
}

/// Validate a branch/worktree name: alphanumeric, hyphens, underscores,
/// slashes, dots. Rejects path traversal (`..`), leading dashes, and control
/// characters.
fn validate_name(name: &str) -> Result<(), WorktreeError> {
    if name.is_empty() {
        return Err(WorktreeError::InvalidName("name cannot be empty".into()));
    }
    if name.starts_with('-') {
        return Err(WorktreeError::InvalidName(
            "name cannot start with a dash".into(),
        ));
    }
    if name.contains("..") {
        return Err(WorktreeError::InvalidName(
            "name cannot contain '..'".into(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
    {
        return Err(WorktreeError::InvalidName(format!(
            "name contains invalid characters: {name}"
        )));
    }
    Ok(())
}

/// Manages git worktrees under a dedicated base directory.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    base_dir: PathBuf,
}

impl WorktreeManager {
    /// Create a new worktree manager.
    pub const fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Create (or find) the worktree for a task.
    ///
    /// The branch name is derived deterministically from the task type and
    /// title. If a worktree for that branch already exists it is returned
    /// as-is; if the branch exists without a worktree, this fails with
    /// `BranchExists` unless `opts.attach_existing` is set.
    pub async fn create_for_task(
        &self,
        repo_path: &Path,
        title: &str,
        task_type: TaskType,
        opts: &CreateOptions,
    ) -> Result<Worktree, WorktreeError> {
        let branch = branch_name(task_type, title);
        debug!(branch, repo_path = %repo_path.display(), "create_for_task: derived branch");
        validate_name(&branch)?;

        if !repo_path.exists() {
            return Err(WorktreeError::RepoNotFound(
                repo_path.display().to_string(),
            ));
        }

        // Idempotent path: an existing worktree for this branch is the answer.
        if let Some(existing) = self.find(repo_path, &branch).await? {
            info!(branch, path = %existing.path.display(), "Worktree already exists, reusing");
            return Ok(existing);
        }

        let repo_name = repo_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        let worktree_path = self.base_dir.join(repo_name).join(&branch);
        tokio::fs::create_dir_all(self.base_dir.join(repo_name)).await?;

        let branch_exists = branch_exists(repo_path, &branch).await?;
        if branch_exists && !opts.attach_existing {
            return Err(WorktreeError::BranchExists(branch));
        }

        let mut args: Vec<String> = vec!["worktree".into(), "add".into()];
        if branch_exists {
            args.push(worktree_path.to_string_lossy().into_owned());
            args.push(branch.clone());
        } else {
            args.push("-b".into());
            args.push(branch.clone());
            args.push(worktree_path.to_string_lossy().into_owned());
            if let Some(base) = &opts.base_branch {
                validate_name(base)?;
                args.push(base.clone());
            }
        }

        let output = tokio::process::Command::new("git")
            .args(&args)
            .current_dir(repo_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("already checked out") || stderr.contains("already used by worktree")
            {
                return Err(WorktreeError::Conflict {
                    branch,
                    path: worktree_path.display().to_string(),
                });
            }
            return Err(WorktreeError::Git(format!(
                "git worktree add failed: {stderr}"
            )));
        }

        info!(branch, path = %worktree_path.display(), "Created git worktree");
        Ok(Worktree {
            name: branch,
            path: worktree_path,
            repo_path: repo_path.to_path_buf(),
        })
    }

    /// List linked worktrees of a repository (the primary checkout is
    /// excluded).
    pub async fn list(&self, repo_path: &Path) -> Result<Vec<Worktree>, WorktreeError> {
        let output = tokio::process::Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(repo_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorktreeError::Git(format!(
                "git worktree list failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut all = parse_porcelain(&stdout, repo_path);
        // The first block is always the primary checkout.
        if !all.is_empty() {
            all.remove(0);
        }
        Ok(all)
    }

    /// Find the worktree checked out at a given branch, if any.
    pub async fn find(
        &self,
        repo_path: &Path,
        name: &str,
    ) -> Result<Option<Worktree>, WorktreeError> {
        Ok(self
            .list(repo_path)
            .await?
            .into_iter()
            .find(|wt| wt.name == name))
    }

    /// Remove a worktree by name. Returns `false` if no such worktree exists.
    pub async fn remove(&self, repo_path: &Path, name: &str) -> Result<bool, WorktreeError> {
        validate_name(name)?;
        let Some(wt) = self.find(repo_path, name).await? else {
            return Ok(false);
        };

        let output = tokio::process::Command::new("git")
            .args(["worktree", "remove", "--force"])
            .arg(&wt.path)
            .current_dir(repo_path)
            .output()
            .await?;

        if output.status.success() {
            info!(name, path = %wt.path.display(), "Removed git worktree");
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(name, error = %stderr.trim(), "git worktree remove failed");
            return Err(WorktreeError::Git(format!(
                "git worktree remove failed: {}",
                stderr.trim()
            )));
        }
        Ok(true)
    }
}

/// Whether a local branch exists in the repository.
async fn branch_exists(repo_path: &Path, branch: &str) -> Result<bool, WorktreeError> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("refs/heads/{branch}"))
        .current_dir(repo_path)
        .output()
        .await?;
    Ok(output.status.success())
}

/// Parse `git worktree list --porcelain` output into worktree records.
/// Detached or bare entries carry no branch and are skipped.
fn parse_porcelain(output: &str, repo_path: &Path) -> Vec<Worktree> {
    let mut result = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;

    let mut flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>| {
        if let Some(p) = path.take() {
            if let Some(b) = branch.take() {
                result.push(Worktree {
                    name: b,
                    path: p,
                    repo_path: repo_path.to_path_buf(),
                });
            }
        }
        *branch = None;
    };

    for line in output.lines() {
        if line.is_empty() {
            flush(&mut path, &mut branch);
        } else if let Some(p) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(p));
        } else if let Some(b) = line.strip_prefix("branch refs/heads/") {
            branch = Some(b.to_string());
        }
    }
    flush(&mut path, &mut branch);
    result
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Initialize a git repo with one commit so branches can be created.
    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@test"],
            vec!["config", "user.name", "test"],
            vec!["commit", "--allow-empty", "-m", "init"],
        ] {
            let out = std::process::Command::new("git")
                .args(&args)
                .current_dir(dir.path())
                .output()
                .unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }
        dir
    }

    #[tokio::test]
    async fn create_derives_branch_from_type_and_title() {
        let repo = init_repo();
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(base.path().to_path_buf());

        let wt = mgr
            .create_for_task(repo.path(), "Fix login bug!!", TaskType::Bug, &CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(wt.name, "fix-fix-login-bug");
        assert!(wt.path.exists());
    }

    #[tokio::test]
    async fn create_twice_returns_existing_worktree() {
        let repo = init_repo();
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(base.path().to_path_buf());
        let opts = CreateOptions::default();

        let first = mgr
            .create_for_task(repo.path(), "Add search", TaskType::Feature, &opts)
            .await
            .unwrap();
        let second = mgr
            .create_for_task(repo.path(), "Add search", TaskType::Feature, &opts)
            .await
            .unwrap();
        assert_eq!(first.path, second.path);

        let list = mgr.list(repo.path()).await.unwrap();
        assert_eq!(list.len(), 1, "no duplicate worktree created");
    }

    #[tokio::test]
    async fn existing_branch_without_worktree_requires_attach() {
        let repo = init_repo();
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(base.path().to_path_buf());

        // Create the branch out of band
        let out = std::process::Command::new("git")
            .args(["branch", "feat-add-search"])
            .current_dir(repo.path())
            .output()
            .unwrap();
        assert!(out.status.success());

        let err = mgr
            .create_for_task(repo.path(), "Add search", TaskType::Feature, &CreateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::BranchExists(_)));

        let attach = CreateOptions {
            attach_existing: true,
            ..CreateOptions::default()
        };
        let wt = mgr
            .create_for_task(repo.path(), "Add search", TaskType::Feature, &attach)
            .await
            .unwrap();
        assert_eq!(wt.name, "feat-add-search");
    }

    #[tokio::test]
    async fn remove_then_list_is_empty() {
        let repo = init_repo();
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(base.path().to_path_buf());

        mgr.create_for_task(repo.path(), "Cleanup", TaskType::Task, &CreateOptions::default())
            .await
            .unwrap();
        assert!(mgr.remove(repo.path(), "task-cleanup").await.unwrap());
        assert!(mgr.list(repo.path()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_missing_returns_false() {
        let repo = init_repo();
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(base.path().to_path_buf());
        assert!(!mgr.remove(repo.path(), "task-nope").await.unwrap());
    }

    #[tokio::test]
    async fn create_nonexistent_repo_errors() {
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(base.path().to_path_buf());
        let err = mgr
            .create_for_task(
                Path::new("/nonexistent/repo"),
                "Fix it",
                TaskType::Bug,
                &CreateOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorktreeError::RepoNotFound(_)));
    }

    #[test]
    fn validate_name_rejects_unsafe_input() {
        assert!(validate_name("").is_err());
        assert!(validate_name("-flag").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("foo bar").is_err());
        assert!(validate_name("foo;rm").is_err());
        assert!(validate_name("fix-login").is_ok());
    }

    #[test]
    fn parse_porcelain_skips_detached() {
        let out = "worktree /repo\nHEAD abc\nbranch refs/heads/main\n\n\
                   worktree /wt/feat-x\nHEAD def\nbranch refs/heads/feat-x\n\n\
                   worktree /wt/detached\nHEAD 123\ndetached\n\n";
        let wts = parse_porcelain(out, Path::new("/repo"));
        assert_eq!(wts.len(), 2);
        assert_eq!(wts[0].name, "main");
        assert_eq!(wts[1].name, "feat-x");
    }
}
