//! Process spawning behind a mockable boundary.
//!
//! [`ProcessSpec`] captures everything about how the agent is launched;
//! [`ProcessRunner`] executes a spec. Tests inject a fake runner so session
//! and orchestrator behavior is deterministic without real subprocesses.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use super::types::SessionError;

/// How to launch one agent process.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Extra environment on top of the inherited one.
    pub env: Vec<(String, String)>,
}

/// Signal-side handle, usable concurrently with the exit waiter.
pub trait ProcessSignal: Send + Sync {
    /// OS pid when known.
    fn pid(&self) -> Option<u32>;
    /// SIGINT equivalent; the process keeps running.
    fn interrupt(&self) -> std::io::Result<()>;
    /// SIGTERM equivalent; request graceful exit.
    fn terminate(&self) -> std::io::Result<()>;
    /// SIGKILL equivalent; escalation when graceful exit times out.
    fn force_kill(&self) -> std::io::Result<()>;
}

/// Exit-side handle, owned by exactly one waiter task.
#[async_trait]
pub trait ProcessWaiter: Send {
    /// Wait for process exit and return its exit code.
    async fn wait(&mut self) -> std::io::Result<i32>;
}

/// A spawned process with its I/O streams and control handles.
pub struct SpawnedProcess {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    pub signal: Arc<dyn ProcessSignal>,
    pub waiter: Box<dyn ProcessWaiter>,
}

/// Executes process specs.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<SpawnedProcess, SessionError>;
}

/// Real runner: spawns the agent binary with fully piped stdio.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentRunner;

#[async_trait]
impl ProcessRunner for AgentRunner {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<SpawnedProcess, SessionError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| SessionError::SpawnFailed {
            reason: e.to_string(),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| SessionError::SpawnFailed {
            reason: "Failed to capture stdin".to_string(),
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SessionError::SpawnFailed {
                reason: "Failed to capture stdout".to_string(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SessionError::SpawnFailed {
                reason: "Failed to capture stderr".to_string(),
            })?;

        let pid = child.id();
        Ok(SpawnedProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            signal: Arc::new(UnixSignal { pid }),
            waiter: Box::new(ChildWaiter { child }),
        })
    }
}

/// pid-based signalling for real child processes.
struct UnixSignal {
    pid: Option<u32>,
}

impl UnixSignal {
    #[cfg(unix)]
    fn send(&self, signal: i32) -> std::io::Result<()> {
        let Some(pid) = self.pid else {
            return Err(std::io::Error::other("process has no pid"));
        };
        // SAFETY: pid was obtained from our own Child handle; kill(2) on an
        // owned subprocess is safe.
        #[allow(unsafe_code)]
        #[allow(clippy::cast_possible_wrap)]
        let ret = unsafe { libc::kill(pid as i32, signal) };
        if ret == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn send(&self, _signal: i32) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }
}

#[cfg(unix)]
const SIGINT: i32 = libc::SIGINT;
#[cfg(unix)]
const SIGTERM: i32 = libc::SIGTERM;
#[cfg(unix)]
const SIGKILL: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const SIGINT: i32 = 2;
#[cfg(not(unix))]
const SIGTERM: i32 = 15;
#[cfg(not(unix))]
const SIGKILL: i32 = 9;

impl ProcessSignal for UnixSignal {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn interrupt(&self) -> std::io::Result<()> {
        self.send(SIGINT)
    }

    fn terminate(&self) -> std::io::Result<()> {
        self.send(SIGTERM)
    }

    fn force_kill(&self) -> std::io::Result<()> {
        self.send(SIGKILL)
    }
}

struct ChildWaiter {
    child: Child,
}

#[async_trait]
impl ProcessWaiter for ChildWaiter {
    async fn wait(&mut self) -> std::io::Result<i32> {
        let status = self.child.wait().await?;
        // Signal-terminated processes report no code; use -1 as the sentinel.
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn agent_runner_spawns_and_waits() {
        let spec = ProcessSpec {
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), "echo hello; exit 7".into()],
            working_dir: std::env::temp_dir(),
            env: Vec::new(),
        };
        let mut proc = AgentRunner.spawn(&spec).await.unwrap();

        let mut lines = BufReader::new(proc.stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "hello");
        assert_eq!(proc.waiter.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn agent_runner_pipes_stdin() {
        let spec = ProcessSpec {
            program: PathBuf::from("cat"),
            args: Vec::new(),
            working_dir: std::env::temp_dir(),
            env: Vec::new(),
        };
        let SpawnedProcess {
            mut stdin,
            stdout,
            mut waiter,
            ..
        } = AgentRunner.spawn(&spec).await.unwrap();

        stdin.write_all(b"echoed\n").await.unwrap();
        stdin.flush().await.unwrap();
        // Dropping the handle closes the pipe; cat exits on EOF.
        drop(stdin);

        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "echoed");
        assert_eq!(waiter.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn spawn_missing_binary_fails() {
        let spec = ProcessSpec {
            program: PathBuf::from("/no/such/binary"),
            args: Vec::new(),
            working_dir: std::env::temp_dir(),
            env: Vec::new(),
        };
        let Err(err) = AgentRunner.spawn(&spec).await else {
            panic!("spawn of a missing binary succeeded");
        };
        assert!(matches!(err, SessionError::SpawnFailed { .. }));
    }
}
