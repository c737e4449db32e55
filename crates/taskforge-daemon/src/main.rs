//! `TaskForge` Daemon
//!
//! Watches a project's task store for planned work and drives each task
//! through an isolated git worktree and a supervised agent session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use taskforge_core::config::{CompletionStatus, load_config};
use taskforge_core::{FileTaskStore, TaskStatus, TaskStore};

use taskforge_daemon::orchestration::{
    AgentRegistry, ExecutionOrchestrator, ExecutionOptions, OrchestratorConfig,
    OrchestratorError,
};
use taskforge_daemon::queue::WorktreeQueueService;
use taskforge_daemon::session::{AgentRunner, SessionManager, SessionManagerConfig};
use taskforge_daemon::worktree::WorktreeManager;

#[derive(Parser, Debug)]
#[command(name = "taskforge-daemon")]
#[command(version, about = "TaskForge daemon - autonomous task executor")]
struct Args {
    /// Repository tasks execute against
    #[arg(long, env = "TASKFORGE_REPO")]
    repo: PathBuf,

    /// Project identifier used for task store scoping
    #[arg(long, default_value = "default", env = "TASKFORGE_PROJECT")]
    project: String,

    /// Branch worktrees fork from
    #[arg(long, default_value = "main", env = "TASKFORGE_BASE_BRANCH")]
    base_branch: String,

    /// Directory for daemon state (tasks, queues, logs, worktrees)
    #[arg(long, env = "TASKFORGE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Path to the agent binary
    #[arg(long, env = "TASKFORGE_AGENT_COMMAND")]
    agent_command: Option<PathBuf>,

    /// Maximum concurrent agent sessions
    #[arg(long, env = "TASKFORGE_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Seconds of session silence before idle reclamation
    #[arg(long, env = "TASKFORGE_IDLE_TIMEOUT_SECS")]
    idle_timeout_secs: Option<u64>,

    /// Wall-clock limit per execution in seconds (0 disables)
    #[arg(long, default_value_t = 0, env = "TASKFORGE_TASK_TIMEOUT_SECS")]
    task_timeout_secs: u64,

    /// Attempts before a failing task is parked as deferred
    #[arg(long, env = "TASKFORGE_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Status applied on successful completion
    #[arg(
        long,
        default_value = "in-review",
        env = "TASKFORGE_COMPLETION_STATUS",
        value_parser = ["in-review", "done"]
    )]
    completion_status: String,

    /// Seconds between task store scans for planned work
    #[arg(long, default_value_t = 10, env = "TASKFORGE_SCAN_INTERVAL_SECS")]
    scan_interval_secs: u64,

    /// Seconds finished executions stay queryable before eviction
    #[arg(long, default_value_t = 3600, env = "TASKFORGE_RESULT_RETENTION_SECS")]
    result_retention_secs: u64,

    /// User recorded as the owner of daemon-initiated executions
    #[arg(long, default_value = "daemon", env = "TASKFORGE_USER")]
    user: String,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, default_value = "info", env = "TASKFORGE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long, env = "TASKFORGE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("taskforge_daemon={}", args.log_level);
    taskforge_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let config = load_config(Some(&args.repo))?;
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => default_state_dir(&config)?,
    };
    let max_sessions = args
        .max_sessions
        .unwrap_or(config.daemon.max_sessions as usize);
    let idle_timeout = Duration::from_secs(
        args.idle_timeout_secs
            .unwrap_or(config.execution.idle_timeout_secs),
    );
    let max_attempts = args.max_attempts.unwrap_or(config.execution.max_attempts);
    let completion_status = match args.completion_status.as_str() {
        "done" => CompletionStatus::Done,
        _ => CompletionStatus::InReview,
    };
    let agent_command = args
        .agent_command
        .unwrap_or_else(|| PathBuf::from(&config.execution.agent_command));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        repo = %args.repo.display(),
        project = %args.project,
        state_dir = %state_dir.display(),
        max_sessions,
        "Starting taskforge-daemon"
    );

    let store: Arc<dyn TaskStore> = Arc::new(FileTaskStore::new(state_dir.join("tasks")));
    let worktrees = WorktreeManager::new(state_dir.join("worktrees"));
    let queue = Arc::new(WorktreeQueueService::new(state_dir.join("queues")));
    let sessions = Arc::new(SessionManager::new(
        Arc::new(AgentRunner),
        SessionManagerConfig {
            agent_command,
            agent_args: config.execution.agent_args.clone(),
            max_sessions,
            idle_timeout,
            ..SessionManagerConfig::default()
        },
    ));

    let orchestrator = Arc::new(ExecutionOrchestrator::new(
        Arc::clone(&store),
        worktrees,
        queue,
        Arc::clone(&sessions),
        OrchestratorConfig {
            repo_path: args.repo.clone(),
            project_id: args.project.clone(),
            base_branch: args.base_branch.clone(),
            log_dir: state_dir.join("logs"),
            max_attempts,
            completion_status,
            task_timeout: (args.task_timeout_secs > 0)
                .then(|| Duration::from_secs(args.task_timeout_secs)),
            progress_poll: Duration::from_secs(30),
        },
    ));
    let registry = Arc::new(AgentRegistry::new(Arc::clone(&orchestrator)));

    // Requeue work left running by a previous process before accepting new.
    let resumed = orchestrator.recover().await;
    if resumed > 0 {
        info!(resumed, "Resumed interrupted worktree queues");
    }

    let sweeper = sessions.spawn_idle_sweeper(Duration::from_secs(60));

    // Periodic eviction of finished executions from the in-memory tables.
    let pruner = {
        let registry = Arc::clone(&registry);
        let retention = Duration::from_secs(args.result_retention_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(300));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.prune_finished(retention).await;
            }
        })
    };

    // Intake loop: pick up planned tasks from the store and start them.
    let intake = {
        let registry = Arc::clone(&registry);
        let store = Arc::clone(&store);
        let project = args.project.clone();
        let user = args.user.clone();
        let interval = Duration::from_secs(args.scan_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let tasks = match store.list(&project).await {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        warn!(error = %e, "Task store scan failed");
                        continue;
                    }
                };
                for task in tasks {
                    if task.status != TaskStatus::Planned {
                        continue;
                    }
                    match registry
                        .start_agent(&task.id, ExecutionOptions::default(), &user)
                        .await
                    {
                        Ok(ack) => info!(
                            task_id = %task.id,
                            execution_id = %ack.execution_id,
                            worktree = %ack.worktree,
                            position = ack.queue_position,
                            "Picked up planned task"
                        ),
                        // A concurrent start already claimed it
                        Err(e)
                            if matches!(
                                e,
                                taskforge_daemon::orchestration::registry::RegistryError::Orchestrator(
                                    OrchestratorError::InvalidState { .. }
                                )
                            ) => {}
                        Err(e) => warn!(task_id = %task.id, error = %e, "Failed to start task"),
                    }
                }
            }
        })
    };

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!("Daemon ready");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    intake.abort();
    sweeper.abort();
    pruner.abort();
    sessions.terminate_all().await;

    info!("Daemon stopped");
    Ok(())
}

/// Default state directory: data dir from config, else `~/.taskforge`.
fn default_state_dir(config: &taskforge_core::config::Config) -> anyhow::Result<PathBuf> {
    if let Some(dir) = &config.daemon.data_dir {
        return Ok(dir.clone());
    }
    if let Some(dir) = taskforge_core::config::default_data_dir() {
        return Ok(dir);
    }
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".taskforge"))
}
