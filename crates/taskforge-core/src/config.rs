//! Configuration resolution for `TaskForge`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/taskforge/settings.json)
//! 3. Project config (.taskforge/settings.json)
//! 4. Environment variables
//! 5. CLI arguments (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete `TaskForge` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub worktrees: WorktreeConfig,
}

/// Daemon-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Maximum concurrent agent sessions.
    pub max_sessions: u32,
    /// Root for persisted daemon state (queues, session logs).
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            max_sessions: 5,
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// Status a task is moved to when its agent session exits successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Leave the result for human review.
    #[default]
    InReview,
    /// Close the task immediately.
    Done,
}

/// Execution policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Command used to launch an agent session.
    pub agent_command: String,
    /// Extra arguments passed before the task prompt.
    pub agent_args: Vec<String>,
    /// Attempts before a failing task is parked as deferred.
    pub max_attempts: u32,
    /// Status applied on successful completion.
    pub completion_status: CompletionStatus,
    /// Seconds of silence before an idle session is reclaimed.
    pub idle_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            agent_command: "claude".to_string(),
            agent_args: Vec::new(),
            max_attempts: 3,
            completion_status: CompletionStatus::default(),
            idle_timeout_secs: 30 * 60, // 30 minutes
        }
    }
}

/// Worktree layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeConfig {
    /// Directory worktrees are created under, relative to the repository
    /// parent when not absolute.
    pub base_dir: PathBuf,
    /// Branch worktrees are forked from.
    pub default_base_branch: String,
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(".taskforge/worktrees"),
            default_base_branch: "main".to_string(),
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load project config
    if let Some(dir) = project_dir {
        let project_path = dir.join(".taskforge").join("settings.json");
        if project_path.exists() {
            let project = load_config_file(&project_path)?;
            merge_config(&mut config, project);
        }
    }

    // Apply environment overrides
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("taskforge").join("settings.json"))
}

/// Get the default data directory for daemon state.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("taskforge"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    // Merge daemon config
    if overlay.daemon.data_dir.is_some() {
        base.daemon.data_dir = overlay.daemon.data_dir;
    }
    base.daemon.max_sessions = overlay.daemon.max_sessions;
    base.daemon.log_level = overlay.daemon.log_level;

    // Execution and worktree sections replace wholesale
    base.execution = overlay.execution;
    base.worktrees = overlay.worktrees;
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("TASKFORGE_MAX_SESSIONS") {
        if let Ok(n) = val.parse() {
            config.daemon.max_sessions = n;
        }
    }
    if let Ok(val) = std::env::var("TASKFORGE_LOG_LEVEL") {
        config.daemon.log_level = val;
    }
    if let Ok(val) = std::env::var("TASKFORGE_AGENT_COMMAND") {
        config.execution.agent_command = val;
    }
    if let Ok(val) = std::env::var("TASKFORGE_MAX_ATTEMPTS") {
        if let Ok(n) = val.parse() {
            config.execution.max_attempts = n;
        }
    }
    if let Ok(val) = std::env::var("TASKFORGE_IDLE_TIMEOUT_SECS") {
        if let Ok(n) = val.parse() {
            config.execution.idle_timeout_secs = n;
        }
    }
}
