//! Agent session lifecycle manager.
//!
//! Owns the session table. Per session: a stdin writer task, stdout/stderr
//! reader tasks publishing typed events, and an exit waiter that emits the
//! final `Close` event and removes the table entry. Explicit terminate and
//! the exit waiter race on the same `HashMap::remove`; whichever wins
//! performs cleanup, which is what makes terminate idempotent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, error, info, warn};

use taskforge_core::task::now_unix;

use super::process::{ProcessRunner, ProcessSignal, ProcessSpec};
use super::types::{SessionError, SessionEvent, SessionInfo, SessionInput};

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Agent binary to launch.
    pub agent_command: PathBuf,
    /// Arguments prepended to every launch.
    pub agent_args: Vec<String>,
    /// Maximum concurrent sessions.
    pub max_sessions: usize,
    /// Event broadcast channel capacity per session.
    pub broadcast_capacity: usize,
    /// Idle window before a session is reclaimed.
    pub idle_timeout: Duration,
    /// Grace period between terminate and force-kill.
    pub terminate_grace: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            agent_command: PathBuf::from("claude"),
            agent_args: Vec::new(),
            max_sessions: 5,
            broadcast_capacity: 256,
            idle_timeout: Duration::from_secs(30 * 60),
            terminate_grace: Duration::from_secs(5),
        }
    }
}

/// Options for one session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub working_dir: PathBuf,
    /// Written to the process's stdin right after spawn.
    pub initial_input: Option<String>,
    /// Extra environment (project/user identifiers and the like).
    pub env: Vec<(String, String)>,
}

struct SessionState {
    user_id: String,
    working_dir: PathBuf,
    created_at: i64,
    stdin_tx: mpsc::Sender<String>,
    event_tx: broadcast::Sender<SessionEvent>,
    signal: Arc<dyn ProcessSignal>,
    /// Unix seconds of last observed input/output activity.
    last_activity: Arc<AtomicI64>,
}

/// Supervises agent processes, keyed by session id.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
    runner: Arc<dyn ProcessRunner>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: SessionManagerConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            runner,
            config,
        }
    }

    /// Spawn an agent process and register the session.
    ///
    /// Returns the session id together with the initial event receiver,
    /// which observes the stream from the very first chunk. Later observers
    /// use [`Self::subscribe`].
    #[allow(clippy::too_many_lines)]
    pub async fn create_session(
        &self,
        user_id: &str,
        opts: SessionOptions,
    ) -> Result<(String, broadcast::Receiver<SessionEvent>), SessionError> {
        let sessions = self.sessions.read().await;
        if sessions.len() >= self.config.max_sessions {
            return Err(SessionError::PoolExhausted {
                current: sessions.len(),
                max: self.config.max_sessions,
            });
        }
        drop(sessions);

        let mut env = opts.env.clone();
        env.push(("TASKFORGE_USER".to_string(), user_id.to_string()));
        let spec = ProcessSpec {
            program: self.config.agent_command.clone(),
            args: self.config.agent_args.clone(),
            working_dir: opts.working_dir.clone(),
            env,
        };

        info!(
            user_id,
            working_dir = %opts.working_dir.display(),
            program = %spec.program.display(),
            "Spawning agent session"
        );
        let spawned = self.runner.spawn(&spec).await?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let (event_tx, event_rx) = broadcast::channel(self.config.broadcast_capacity);
        let last_activity = Arc::new(AtomicI64::new(now_unix()));
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);

        // Register before spawning the exit waiter. A fast-exiting process
        // would otherwise run the waiter's remove before the insert and
        // leave a stale entry holding a pool slot.
        let state = SessionState {
            user_id: user_id.to_string(),
            working_dir: opts.working_dir,
            created_at: now_unix(),
            stdin_tx: stdin_tx.clone(),
            event_tx: event_tx.clone(),
            signal: Arc::clone(&spawned.signal),
            last_activity: Arc::clone(&last_activity),
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), state);

        // Stdin writer task
        let mut stdin = spawned.stdin;
        let sid = session_id.clone();
        tokio::spawn(async move {
            while let Some(line) = stdin_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    error!(session_id = %sid, "Failed to write to stdin: {e}");
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    error!(session_id = %sid, "Failed to write newline: {e}");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    error!(session_id = %sid, "Failed to flush stdin: {e}");
                    break;
                }
            }
        });

        // Stdout reader task
        let tx = event_tx.clone();
        let activity = Arc::clone(&last_activity);
        let sid = session_id.clone();
        let stdout = spawned.stdout;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                activity.store(now_unix(), Ordering::Relaxed);
                debug!(session_id = %sid, "stdout: {line}");
                let _ = tx.send(SessionEvent::Output { data: line });
            }
            debug!(session_id = %sid, "stdout reader finished");
        });

        // Stderr reader task
        let tx = event_tx.clone();
        let activity = Arc::clone(&last_activity);
        let sid = session_id.clone();
        let stderr = spawned.stderr;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                activity.store(now_unix(), Ordering::Relaxed);
                warn!(session_id = %sid, "stderr: {line}");
                let _ = tx.send(SessionEvent::ErrorMsg { data: line });
            }
            debug!(session_id = %sid, "stderr reader finished");
        });

        // Exit waiter: emits the final Close event and removes the entry.
        let tx = event_tx.clone();
        let sid = session_id.clone();
        let table = Arc::clone(&self.sessions);
        let mut waiter = spawned.waiter;
        tokio::spawn(async move {
            let exit_code = match waiter.wait().await {
                Ok(code) => code,
                Err(e) => {
                    warn!(session_id = %sid, error = %e, "Process wait failed");
                    -1
                }
            };
            info!(session_id = %sid, exit_code, "Agent process exited");
            let _ = tx.send(SessionEvent::Close { exit_code });
            table.write().await.remove(&sid);
        });

        if let Some(input) = opts.initial_input {
            if stdin_tx.send(input).await.is_err() {
                self.sessions.write().await.remove(&session_id);
                return Err(SessionError::ProcessExited { id: session_id });
            }
        }

        Ok((session_id, event_rx))
    }

    /// Write a line to a session's stdin.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn send_input(&self, session_id: &str, data: &str) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let state = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        state.last_activity.store(now_unix(), Ordering::Relaxed);
        state
            .stdin_tx
            .send(data.to_string())
            .await
            .map_err(|_| SessionError::ProcessExited {
                id: session_id.to_string(),
            })
    }

    /// Interrupt a session's process; the session record survives.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn interrupt(&self, session_id: &str) -> Result<(), SessionError> {
        let sessions = self.sessions.read().await;
        let state = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        debug!(session_id, "Interrupting session");
        state.signal.interrupt()?;
        Ok(())
    }

    /// Route a decoded inbound message to the matching session operation.
    pub async fn dispatch(
        &self,
        session_id: &str,
        input: SessionInput,
    ) -> Result<(), SessionError> {
        match input {
            SessionInput::Input { data } => self.send_input(session_id, &data).await,
            SessionInput::Interrupt => self.interrupt(session_id).await,
        }
    }

    /// Terminate a session and remove it from the table.
    ///
    /// Idempotent: a second call (or a call racing the exit waiter) finds no
    /// entry and returns Ok.
    pub async fn terminate(&self, session_id: &str) -> Result<(), SessionError> {
        let Some(state) = self.sessions.write().await.remove(session_id) else {
            debug!(session_id, "Terminate on unknown session, no-op");
            return Ok(());
        };

        info!(session_id, "Terminating session");
        if let Err(e) = state.signal.terminate() {
            warn!(session_id, error = %e, "Terminate signal failed, escalating");
            state.signal.force_kill().ok();
            return Ok(());
        }

        // Escalate if the process ignores the graceful signal. The exit
        // waiter still owns wait(), so this only fires the kill signal; a
        // kill on an already-exited pid is reported and ignored.
        let signal = Arc::clone(&state.signal);
        let grace = self.config.terminate_grace;
        let sid = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Err(e) = signal.force_kill() {
                debug!(session_id = %sid, error = %e, "Force kill after grace period failed");
            }
        });
        Ok(())
    }

    /// Subscribe to a session's event stream.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<broadcast::Receiver<SessionEvent>, SessionError> {
        let sessions = self.sessions.read().await;
        let state = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound {
                id: session_id.to_string(),
            })?;
        Ok(state.event_tx.subscribe())
    }

    /// Snapshots of all live sessions.
    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        let now = now_unix();
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, state)| SessionInfo {
                session_id: id.clone(),
                user_id: state.user_id.clone(),
                working_dir: state.working_dir.clone(),
                created_at: state.created_at,
                idle_secs: (now - state.last_activity.load(Ordering::Relaxed)).max(0)
                    .unsigned_abs(),
            })
            .collect()
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Terminate sessions idle beyond the configured window. Returns how
    /// many were reclaimed.
    pub async fn reclaim_idle(&self) -> usize {
        let cutoff = now_unix() - i64::try_from(self.config.idle_timeout.as_secs()).unwrap_or(i64::MAX);
        let idle: Vec<String> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.last_activity.load(Ordering::Relaxed) < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        let mut reclaimed = 0;
        for id in idle {
            info!(session_id = %id, "Reclaiming idle session");
            if self.terminate(&id).await.is_ok() {
                reclaimed += 1;
            }
        }
        reclaimed
    }

    /// Terminate every live session (daemon shutdown).
    pub async fn terminate_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            let _ = self.terminate(&id).await;
        }
    }

    /// Background task that sweeps for idle sessions periodically.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reclaimed = manager.reclaim_idle().await;
                if reclaimed > 0 {
                    info!(reclaimed, "Idle sweep reclaimed sessions");
                }
            }
        })
    }
}
