//! Execution orchestrator.
//!
//! Drives the full lifecycle: validate task state, resolve the worktree,
//! enqueue, and let a per-worktree driver task pull entries through
//! running to a terminal status. Callers get an immediate acknowledgment;
//! mid-flight failures land on the queue entry and the task record, never
//! back on the original caller.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{debug, error, info, warn};

use taskforge_core::config::CompletionStatus;
use taskforge_core::task::now_unix;
use taskforge_core::{Task, TaskStatus, TaskStore, WorktreeStatus};

use crate::progress;
use crate::queue::{QueueEntry, QueueEntryStatus, QueueError, WorktreeQueueService};
use crate::session::{SessionError, SessionEvent, SessionManager, SessionOptions};
use crate::worktree::{CreateOptions, RepoActivity, Worktree, WorktreeError, WorktreeManager, stats};

use super::types::{
    ExecutionOptions, ExecutionPhase, ExecutionResult, ExecutionSnapshot, StartAck, StartRequest,
};

/// Errors surfaced synchronously from orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task state: task {task_id} is {status:?}, expected planned")]
    InvalidState { task_id: String, status: TaskStatus },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error(transparent)]
    Worktree(#[from] WorktreeError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Task store error: {0}")]
    Store(taskforge_core::Error),
}

impl From<taskforge_core::Error> for OrchestratorError {
    fn from(e: taskforge_core::Error) -> Self {
        match e {
            taskforge_core::Error::TaskNotFound(id) => Self::TaskNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Repository tasks execute against.
    pub repo_path: PathBuf,
    /// Project scope for task store lookups.
    pub project_id: String,
    /// Branch worktrees fork from and progress stats diff against.
    pub base_branch: String,
    /// Directory for per-execution process logs.
    pub log_dir: PathBuf,
    /// Failed executions requeue the task until this many attempts, then
    /// park it as deferred.
    pub max_attempts: u32,
    /// Task status applied on successful completion.
    pub completion_status: CompletionStatus,
    /// Optional wall-clock limit per execution.
    pub task_timeout: Option<Duration>,
    /// Progress estimation interval.
    pub progress_poll: Duration,
}

struct ExecutionState {
    task_id: String,
    user_id: String,
    worktree: String,
    phase: ExecutionPhase,
    progress: u8,
    session_id: Option<String>,
    options: ExecutionOptions,
    result: Option<ExecutionResult>,
    started_at: i64,
    /// Set when the phase turns terminal; drives pruning.
    finished_at: Option<i64>,
}

impl ExecutionState {
    fn snapshot(&self, execution_id: &str) -> ExecutionSnapshot {
        ExecutionSnapshot {
            execution_id: execution_id.to_string(),
            task_id: self.task_id.clone(),
            user_id: self.user_id.clone(),
            worktree: self.worktree.clone(),
            phase: self.phase,
            progress: self.progress,
            session_id: self.session_id.clone(),
            started_at: self.started_at,
        }
    }
}

/// Coordinates worktrees, queues, and sessions for task execution.
pub struct ExecutionOrchestrator {
    store: Arc<dyn TaskStore>,
    worktrees: WorktreeManager,
    queue: Arc<WorktreeQueueService>,
    sessions: Arc<SessionManager>,
    config: OrchestratorConfig,
    executions: RwLock<HashMap<String, Arc<RwLock<ExecutionState>>>>,
    /// Active (non-terminal) execution per task.
    by_task: RwLock<HashMap<String, String>>,
    /// Worktrees that already have a driver task.
    drivers: Mutex<HashSet<String>>,
    /// Serializes the validate-and-enqueue section of `start`.
    start_lock: Mutex<()>,
}

impl ExecutionOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        worktrees: WorktreeManager,
        queue: Arc<WorktreeQueueService>,
        sessions: Arc<SessionManager>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            worktrees,
            queue,
            sessions,
            config,
            executions: RwLock::new(HashMap::new()),
            by_task: RwLock::new(HashMap::new()),
            drivers: Mutex::new(HashSet::new()),
            start_lock: Mutex::new(()),
        }
    }

    /// Accept a start-work request.
    ///
    /// Validates the task, resolves its worktree, enqueues it, and returns
    /// immediately; the caller never blocks on queue turn. Execution
    /// proceeds on the worktree's driver task.
    pub async fn start(self: &Arc<Self>, req: StartRequest) -> Result<StartAck, OrchestratorError> {
        let guard = self.start_lock.lock().await;

        let mut task = self
            .store
            .get(&self.config.project_id, &req.task_id)
            .await?;
        if task.status != TaskStatus::Planned {
            return Err(OrchestratorError::InvalidState {
                task_id: task.id,
                status: task.status,
            });
        }

        let worktree = self
            .worktrees
            .create_for_task(
                &self.config.repo_path,
                &task.title,
                task.task_type,
                &CreateOptions {
                    base_branch: Some(self.config.base_branch.clone()),
                    attach_existing: true,
                },
            )
            .await?;

        let position = self.queue.enqueue(&worktree.name, &task.id).await?;

        task.worktree_name = Some(worktree.name.clone());
        task.worktree_path = Some(worktree.path.display().to_string());
        task.worktree_status = Some(WorktreeStatus::Active);
        task.status = TaskStatus::Queued;
        task.touch();
        self.store.save(&task).await?;
        drop(guard);

        let execution_id = uuid::Uuid::new_v4().to_string();
        let state = Arc::new(RwLock::new(ExecutionState {
            task_id: task.id.clone(),
            user_id: req.user_id,
            worktree: worktree.name.clone(),
            phase: ExecutionPhase::Queued,
            progress: 0,
            session_id: None,
            options: req.options,
            result: None,
            started_at: now_unix(),
            finished_at: None,
        }));
        self.executions
            .write()
            .await
            .insert(execution_id.clone(), state);
        self.by_task
            .write()
            .await
            .insert(task.id.clone(), execution_id.clone());

        self.ensure_driver(&worktree).await;

        info!(
            task_id = %task.id,
            execution_id = %execution_id,
            worktree = %worktree.name,
            position,
            "Accepted execution request"
        );
        Ok(StartAck {
            execution_id,
            phase: ExecutionPhase::Queued,
            queue_position: position,
            worktree: worktree.name,
        })
    }

    /// Snapshot of one execution.
    pub async fn status(&self, execution_id: &str) -> Result<ExecutionSnapshot, OrchestratorError> {
        let executions = self.executions.read().await;
        let state = executions
            .get(execution_id)
            .ok_or_else(|| OrchestratorError::ExecutionNotFound(execution_id.to_string()))?;
        let snapshot = state.read().await.snapshot(execution_id);
        Ok(snapshot)
    }

    /// Snapshots of all non-terminal executions, optionally scoped to a user.
    pub async fn active(&self, user_id: Option<&str>) -> Vec<ExecutionSnapshot> {
        let executions = self.executions.read().await;
        let mut result = Vec::new();
        for (id, state) in executions.iter() {
            let state = state.read().await;
            if state.phase.is_terminal() {
                continue;
            }
            if user_id.is_some_and(|u| u != state.user_id) {
                continue;
            }
            result.push(state.snapshot(id));
        }
        result
    }

    /// Result of a finished execution, if any.
    pub async fn result(&self, execution_id: &str) -> Option<ExecutionResult> {
        let executions = self.executions.read().await;
        let state = executions.get(execution_id)?;
        let state = state.read().await;
        state.result.clone()
    }

    /// Cancel an execution. Idempotent; terminal executions are left alone.
    pub async fn stop(&self, execution_id: &str) -> Result<(), OrchestratorError> {
        let state = {
            let executions = self.executions.read().await;
            executions
                .get(execution_id)
                .map(Arc::clone)
                .ok_or_else(|| OrchestratorError::ExecutionNotFound(execution_id.to_string()))?
        };

        let (phase, task_id, worktree, session_id) = {
            let s = state.read().await;
            (s.phase, s.task_id.clone(), s.worktree.clone(), s.session_id.clone())
        };

        match phase {
            ExecutionPhase::Initializing | ExecutionPhase::Queued => {
                {
                    let mut s = state.write().await;
                    s.phase = ExecutionPhase::Cancelled;
                    s.finished_at = Some(now_unix());
                }
                if let Err(e) = self
                    .queue
                    .mark_terminal(&worktree, &task_id, QueueEntryStatus::Cancelled, None)
                    .await
                {
                    warn!(execution_id, error = %e, "Cancel: queue entry already gone");
                }
                self.write_task_status(&task_id, TaskStatus::Cancelled).await;
                self.by_task.write().await.remove(&task_id);
                info!(execution_id, task_id, "Cancelled queued execution");
            }
            ExecutionPhase::Running => {
                // Flag first so the driver's close handler treats the exit
                // as a cancellation, not a failure.
                {
                    let mut s = state.write().await;
                    s.phase = ExecutionPhase::Cancelled;
                    s.finished_at = Some(now_unix());
                }
                if let Some(session_id) = session_id {
                    self.sessions.terminate(&session_id).await?;
                }
                info!(execution_id, task_id, "Cancelled running execution");
            }
            ExecutionPhase::Completed | ExecutionPhase::Failed | ExecutionPhase::Cancelled => {
                debug!(execution_id, "Stop on terminal execution, no-op");
            }
        }
        Ok(())
    }

    /// Reconcile persisted queue state after a restart.
    ///
    /// Entries left running by a previous process are requeued, and a driver
    /// is restarted for every worktree that still has pending entries.
    /// Returns how many worktrees were resumed.
    pub async fn recover(self: &Arc<Self>) -> usize {
        let pending = self.queue.recover().await;
        let mut resumed = 0;
        for name in pending {
            match self.worktrees.find(&self.config.repo_path, &name).await {
                Ok(Some(worktree)) => {
                    info!(worktree = %name, "Resuming pending queue");
                    self.ensure_driver(&worktree).await;
                    resumed += 1;
                }
                Ok(None) => {
                    warn!(worktree = %name, "Pending queue for a worktree that no longer exists");
                }
                Err(e) => {
                    warn!(worktree = %name, error = %e, "Worktree lookup failed during recovery");
                }
            }
        }
        resumed
    }

    /// Drop terminal executions older than `retention` from the in-memory
    /// tables. Returns the evicted execution ids.
    pub async fn prune_finished(&self, retention: Duration) -> Vec<String> {
        let cutoff = now_unix() - i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
        let mut executions = self.executions.write().await;
        let mut evicted = Vec::new();
        for (id, state) in executions.iter() {
            let s = state.read().await;
            if s.phase.is_terminal() && s.finished_at.unwrap_or(s.started_at) <= cutoff {
                evicted.push(id.clone());
            }
        }
        for id in &evicted {
            executions.remove(id);
        }
        drop(executions);

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Pruned finished executions");
        }
        evicted
    }

    /// Spawn the driver task for a worktree if it does not have one yet.
    async fn ensure_driver(self: &Arc<Self>, worktree: &Worktree) {
        let mut drivers = self.drivers.lock().await;
        if drivers.insert(worktree.name.clone()) {
            debug!(worktree = %worktree.name, "Spawning worktree driver");
            let this = Arc::clone(self);
            let worktree = worktree.clone();
            tokio::spawn(async move {
                this.run_driver(worktree).await;
            });
        }
    }

    /// Per-worktree loop: pull queued entries and execute them one at a time.
    async fn run_driver(self: Arc<Self>, worktree: Worktree) {
        let notify = self.queue.notifier(&worktree.name).await;
        loop {
            let Some(entry) = self.queue.dequeue(&worktree.name).await else {
                // Bounded wait so a wakeup lost between the dequeue and the
                // notified() registration only delays, never deadlocks.
                let _ =
                    tokio::time::timeout(Duration::from_millis(500), notify.notified()).await;
                continue;
            };
            self.run_entry(&worktree, entry).await;
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run_entry(&self, worktree: &Worktree, entry: QueueEntry) {
        let task_id = entry.task_id.clone();
        if let Err(e) = self.queue.mark_running(&worktree.name, &task_id).await {
            // Another entry still running; the terminal notify will retry us.
            debug!(worktree = %worktree.name, task_id, error = %e, "mark_running deferred");
            tokio::time::sleep(Duration::from_millis(100)).await;
            return;
        }

        let mut task = match self.store.get(&self.config.project_id, &task_id).await {
            Ok(task) => task,
            Err(e) => {
                error!(task_id, error = %e, "Task vanished from store, failing entry");
                let _ = self
                    .queue
                    .mark_terminal(
                        &worktree.name,
                        &task_id,
                        QueueEntryStatus::Failed,
                        Some(format!("task load failed: {e}")),
                    )
                    .await;
                return;
            }
        };

        task.status = TaskStatus::InProgress;
        task.attempts += 1;
        task.touch();
        if let Err(e) = self.store.save(&task).await {
            error!(task_id, error = %e, "Failed to persist in-progress status");
        }

        let state = self.state_for_task(&task_id).await;
        let options = match &state {
            Some(s) => s.read().await.options,
            None => ExecutionOptions::default(),
        };
        let user_id = match &state {
            Some(s) => s.read().await.user_id.clone(),
            None => "system".to_string(),
        };

        let payload = compose_payload(&task, options);
        let session_result = self
            .sessions
            .create_session(
                &user_id,
                SessionOptions {
                    working_dir: worktree.path.clone(),
                    initial_input: Some(payload),
                    env: vec![
                        (
                            "TASKFORGE_PROJECT".to_string(),
                            self.config.project_id.clone(),
                        ),
                        ("TASKFORGE_TASK".to_string(), task.id.clone()),
                    ],
                },
            )
            .await;

        let (session_id, events) = match session_result {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(task_id, error = %e, "Agent spawn failed");
                self.finish_failed(worktree, &mut task, state.as_ref(), format!("spawn failed: {e}"))
                    .await;
                return;
            }
        };

        if let Some(state) = &state {
            let mut s = state.write().await;
            s.session_id = Some(session_id.clone());
            s.phase = ExecutionPhase::Running;
        }

        let log_path = self
            .config
            .log_dir
            .join(format!("{}-{}.log", task.id, entry.sequence));
        let outcome = self
            .supervise(worktree, &task, events, &log_path, state.as_ref())
            .await;

        // A stop() racing the close handler flags the state Cancelled.
        let cancelled = match &state {
            Some(s) => s.read().await.phase == ExecutionPhase::Cancelled,
            None => false,
        };

        if cancelled {
            let _ = self
                .queue
                .mark_terminal(&worktree.name, &task.id, QueueEntryStatus::Cancelled, None)
                .await;
            self.write_task_status(&task.id, TaskStatus::Cancelled).await;
            self.by_task.write().await.remove(&task.id);
            info!(task_id = %task.id, "Execution cancelled");
            return;
        }

        match outcome {
            Outcome::Exited(0) => {
                self.finish_completed(worktree, &mut task, state.as_ref(), &log_path, options)
                    .await;
            }
            Outcome::Exited(code) => {
                self.finish_failed_with_log(
                    worktree,
                    &mut task,
                    state.as_ref(),
                    &log_path,
                    format!("agent exited with code {code}"),
                )
                .await;
            }
            Outcome::TimedOut => {
                let _ = self.sessions.terminate(&session_id).await;
                self.finish_failed_with_log(
                    worktree,
                    &mut task,
                    state.as_ref(),
                    &log_path,
                    "task wall-clock timeout exceeded".to_string(),
                )
                .await;
            }
        }
    }

    /// Bridge session events to the log file and poll progress until the
    /// process closes or the wall-clock limit fires.
    async fn supervise(
        &self,
        worktree: &Worktree,
        task: &Task,
        mut events: broadcast::Receiver<SessionEvent>,
        log_path: &std::path::Path,
        state: Option<&Arc<RwLock<ExecutionState>>>,
    ) -> Outcome {
        let mut log = open_log(log_path).await;
        let started = tokio::time::Instant::now();
        let deadline = self.config.task_timeout.map(|t| started + t);
        let mut progress_tick = tokio::time::interval(self.config.progress_poll);
        progress_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        progress_tick.tick().await; // first tick is immediate

        loop {
            let timeout_fut = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = events.recv() => match event {
                    Ok(SessionEvent::Output { data }) => {
                        append_log(&mut log, &data).await;
                    }
                    Ok(SessionEvent::ErrorMsg { data }) => {
                        append_log(&mut log, &format!("[stderr] {data}")).await;
                    }
                    Ok(SessionEvent::Close { exit_code }) => {
                        return Outcome::Exited(exit_code);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(task_id = %task.id, skipped, "Event stream lagged, log is incomplete");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Sender dropped without a Close event; abnormal.
                        return Outcome::Exited(-1);
                    }
                },
                _ = progress_tick.tick() => {
                    let elapsed = started.elapsed().as_secs();
                    let activity: Option<RepoActivity> =
                        stats::repo_activity(&worktree.path, &self.config.base_branch).await;
                    let estimate = progress::estimate(elapsed, task.effort, activity);
                    if let Some(state) = state {
                        let mut s = state.write().await;
                        // Monotonic across polls even if signals regress
                        s.progress = s.progress.max(estimate);
                    }
                }
                _ = timeout_fut => {
                    warn!(task_id = %task.id, "Task timeout reached");
                    return Outcome::TimedOut;
                }
            }
        }
    }

    async fn finish_completed(
        &self,
        worktree: &Worktree,
        task: &mut Task,
        state: Option<&Arc<RwLock<ExecutionState>>>,
        log_path: &std::path::Path,
        options: ExecutionOptions,
    ) {
        let result = locate_artifacts(&worktree.path, log_path, options, true, None);
        let _ = self
            .queue
            .mark_terminal(&worktree.name, &task.id, QueueEntryStatus::Completed, None)
            .await;

        task.status = match self.config.completion_status {
            CompletionStatus::InReview => TaskStatus::InReview,
            CompletionStatus::Done => TaskStatus::Done,
        };
        task.touch();
        if let Err(e) = self.store.save(task).await {
            error!(task_id = %task.id, error = %e, "Failed to persist completion");
        }

        if let Some(state) = state {
            let mut s = state.write().await;
            s.phase = ExecutionPhase::Completed;
            s.progress = 100;
            s.result = Some(result);
            s.finished_at = Some(now_unix());
        }
        self.by_task.write().await.remove(&task.id);
        info!(task_id = %task.id, worktree = %worktree.name, "Execution completed");
    }

    async fn finish_failed_with_log(
        &self,
        worktree: &Worktree,
        task: &mut Task,
        state: Option<&Arc<RwLock<ExecutionState>>>,
        log_path: &std::path::Path,
        reason: String,
    ) {
        let result = locate_artifacts(
            &worktree.path,
            log_path,
            ExecutionOptions::default(),
            false,
            Some(reason.clone()),
        );
        self.fail_entry_and_requeue(worktree, task, reason).await;
        if let Some(state) = state {
            let mut s = state.write().await;
            s.phase = ExecutionPhase::Failed;
            s.result = Some(result);
            s.finished_at = Some(now_unix());
        }
        self.by_task.write().await.remove(&task.id);
    }

    async fn finish_failed(
        &self,
        worktree: &Worktree,
        task: &mut Task,
        state: Option<&Arc<RwLock<ExecutionState>>>,
        reason: String,
    ) {
        self.fail_entry_and_requeue(worktree, task, reason.clone()).await;
        if let Some(state) = state {
            let mut s = state.write().await;
            s.phase = ExecutionPhase::Failed;
            s.result = Some(ExecutionResult {
                success: false,
                log_path: PathBuf::new(),
                screenshots_dir: None,
                video_path: None,
                docs_dir: None,
                error: Some(reason),
            });
            s.finished_at = Some(now_unix());
        }
        self.by_task.write().await.remove(&task.id);
    }

    /// Mark the queue entry failed and apply the retry policy: requeue to
    /// planned below the attempt cutoff, park as deferred at it.
    async fn fail_entry_and_requeue(&self, worktree: &Worktree, task: &mut Task, reason: String) {
        let _ = self
            .queue
            .mark_terminal(
                &worktree.name,
                &task.id,
                QueueEntryStatus::Failed,
                Some(reason.clone()),
            )
            .await;

        task.status = if task.attempts < self.config.max_attempts {
            TaskStatus::Planned
        } else {
            TaskStatus::Deferred
        };
        task.touch();
        if let Err(e) = self.store.save(task).await {
            error!(task_id = %task.id, error = %e, "Failed to persist failure status");
        }
        warn!(
            task_id = %task.id,
            attempts = task.attempts,
            status = ?task.status,
            reason,
            "Execution failed"
        );
    }

    async fn write_task_status(&self, task_id: &str, status: TaskStatus) {
        match self.store.get(&self.config.project_id, task_id).await {
            Ok(mut task) => {
                task.status = status;
                task.touch();
                if let Err(e) = self.store.save(&task).await {
                    error!(task_id, error = %e, "Failed to persist task status");
                }
            }
            Err(e) => warn!(task_id, error = %e, "Task not found for status write"),
        }
    }

    async fn state_for_task(&self, task_id: &str) -> Option<Arc<RwLock<ExecutionState>>> {
        let execution_id = self.by_task.read().await.get(task_id).cloned()?;
        self.executions.read().await.get(&execution_id).map(Arc::clone)
    }
}

enum Outcome {
    Exited(i32),
    TimedOut,
}

/// Compose the instruction payload handed to the agent on stdin.
fn compose_payload(task: &Task, options: ExecutionOptions) -> String {
    let mut payload = format!("Work on task {}: {}", task.id, task.title);
    if !task.description.is_empty() {
        payload.push_str("\n\n");
        payload.push_str(&task.description);
    }
    let mut directives = Vec::new();
    if options.dry_run {
        directives.push("Plan the work only; do not modify any files.");
    }
    if options.skip_tests {
        directives.push("Skip running tests.");
    }
    if options.skip_demo {
        directives.push("Skip the demo.");
    }
    if options.capture_screenshots {
        directives.push("Capture screenshots of UI changes under .taskforge/screenshots/.");
    }
    if options.capture_video {
        directives.push("Record a demo video at demo.webm.");
    }
    if options.create_documentation {
        directives.push("Write documentation for the change under docs/.");
    }
    if !directives.is_empty() {
        payload.push_str("\n\n");
        payload.push_str(&directives.join("\n"));
    }
    payload
}

/// Reference agent-produced artifacts in the worktree. The agent creates
/// them; this only records where they are.
fn locate_artifacts(
    worktree_path: &std::path::Path,
    log_path: &std::path::Path,
    options: ExecutionOptions,
    success: bool,
    error: Option<String>,
) -> ExecutionResult {
    let existing = |p: PathBuf| if p.exists() { Some(p) } else { None };
    ExecutionResult {
        success,
        log_path: log_path.to_path_buf(),
        screenshots_dir: options
            .capture_screenshots
            .then(|| existing(worktree_path.join(".taskforge").join("screenshots")))
            .flatten(),
        video_path: options
            .capture_video
            .then(|| existing(worktree_path.join("demo.webm")))
            .flatten(),
        docs_dir: options
            .create_documentation
            .then(|| existing(worktree_path.join("docs")))
            .flatten(),
        error,
    }
}

async fn open_log(path: &std::path::Path) -> Option<tokio::fs::File> {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            warn!(path = %path.display(), error = %e, "Cannot create log directory");
            return None;
        }
    }
    match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(file) => Some(file),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot open execution log");
            None
        }
    }
}

async fn append_log(log: &mut Option<tokio::fs::File>, line: &str) {
    if let Some(file) = log {
        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
            warn!(error = %e, "Execution log write failed, dropping log output");
            *log = None;
        }
    }
}
