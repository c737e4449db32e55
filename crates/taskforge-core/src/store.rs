//! Task store boundary.
//!
//! The daemon never talks to task files directly; it goes through the
//! [`TaskStore`] trait so tests can swap in an in-memory double. The
//! shipped implementation is [`FileTaskStore`], one JSON file per task
//! under `<root>/<project_id>/<task_id>.json`, written atomically via
//! temp-file-and-rename so a crash mid-write never leaves a torn file.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Error, Result};
use crate::task::Task;

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
///
/// The write goes to a temp file in the same directory and is moved into
/// place with a rename, which is atomic on POSIX filesystems.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Config(format!("path has no parent: {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Read and deserialize a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Storage boundary for tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Fetch a task by id within a project.
    async fn get(&self, project_id: &str, task_id: &str) -> Result<Task>;

    /// Persist a task, creating or replacing its record.
    async fn save(&self, task: &Task) -> Result<()>;

    /// List all tasks in a project, in unspecified order.
    async fn list(&self, project_id: &str) -> Result<Vec<Task>>;
}

/// File-backed task store, one JSON document per task.
#[derive(Debug, Clone)]
pub struct FileTaskStore {
    root: PathBuf,
}

impl FileTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, project_id: &str, task_id: &str) -> PathBuf {
        self.root.join(project_id).join(format!("{task_id}.json"))
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn get(&self, project_id: &str, task_id: &str) -> Result<Task> {
        let path = self.task_path(project_id, task_id);
        if !path.exists() {
            return Err(Error::TaskNotFound(task_id.to_string()));
        }
        let path_clone = path.clone();
        tokio::task::spawn_blocking(move || read_json(&path_clone))
            .await
            .map_err(|e| Error::Config(format!("task read join error: {e}")))?
    }

    async fn save(&self, task: &Task) -> Result<()> {
        let path = self.task_path(&task.project_id, &task.id);
        debug!(task_id = %task.id, path = %path.display(), "saving task");
        let task = task.clone();
        tokio::task::spawn_blocking(move || atomic_write_json(&path, &task))
            .await
            .map_err(|e| Error::Config(format!("task write join error: {e}")))?
    }

    async fn list(&self, project_id: &str) -> Result<Vec<Task>> {
        let dir = self.root.join(project_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = tokio::task::spawn_blocking(move || -> Result<Vec<Task>> {
            let mut tasks = Vec::new();
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    tasks.push(read_json(&path)?);
                }
            }
            Ok(tasks)
        })
        .await
        .map_err(|e| Error::Config(format!("task list join error: {e}")))??;
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::task::TaskType;

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());

        let task = Task::new("t-1", "proj", "Fix login bug", TaskType::Bug);
        store.save(&task).await.unwrap();

        let loaded = store.get("proj", "t-1").await.unwrap();
        assert_eq!(loaded.id, "t-1");
        assert_eq!(loaded.task_type, TaskType::Bug);
    }

    #[tokio::test]
    async fn get_missing_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());

        let err = store.get("proj", "missing").await.unwrap_err();
        assert!(matches!(err, Error::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn save_overwrites_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());

        let mut task = Task::new("t-1", "proj", "Fix login bug", TaskType::Bug);
        store.save(&task).await.unwrap();

        task.attempts = 2;
        store.save(&task).await.unwrap();

        let loaded = store.get("proj", "t-1").await.unwrap();
        assert_eq!(loaded.attempts, 2);
    }

    #[tokio::test]
    async fn list_returns_all_project_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaskStore::new(dir.path());

        for i in 0..3 {
            let task = Task::new(format!("t-{i}"), "proj", "Task", TaskType::Task);
            store.save(&task).await.unwrap();
        }
        let other = Task::new("t-x", "other", "Task", TaskType::Task);
        store.save(&other).await.unwrap();

        let tasks = store.list("proj").await.unwrap();
        assert_eq!(tasks.len(), 3);

        let empty = store.list("nope").await.unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn atomic_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("doc.json");
        atomic_write_json(&path, &serde_json::json!({"k": 1})).unwrap();
        let value: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(value["k"], 1);
    }
}
