//! Fake process runner for tests.
//!
//! Spawns no real processes: stdio is backed by in-memory pipes and the exit
//! code is delivered over a channel, so tests can script process behavior
//! deterministically.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
use tokio::sync::{Mutex, mpsc, oneshot};

use super::process::{ProcessRunner, ProcessSignal, ProcessSpec, ProcessWaiter, SpawnedProcess};
use super::types::SessionError;

/// Handle to one fake process, for driving it from the test body.
pub struct FakeProcess {
    /// Spec the runner was invoked with.
    pub spec: ProcessSpec,
    /// Write end feeding the session's stdout reader.
    pub stdout: DuplexStream,
    /// Write end feeding the session's stderr reader.
    pub stderr: DuplexStream,
    /// Read end capturing what the session wrote to stdin.
    pub stdin: DuplexStream,
    /// Deliver the exit code; the waiter resolves once this fires.
    pub exit: Option<oneshot::Sender<i32>>,
    pub interrupted: Arc<AtomicBool>,
    pub terminated: Arc<AtomicBool>,
}

impl FakeProcess {
    /// Emit a line on the fake process's stdout.
    pub async fn emit_stdout(&mut self, line: &str) {
        self.stdout
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
        self.stdout.flush().await.unwrap();
    }

    /// Emit a line on the fake process's stderr.
    pub async fn emit_stderr(&mut self, line: &str) {
        self.stderr
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
        self.stderr.flush().await.unwrap();
    }

    /// Exit with the given code. Closes the stdio pipes first so readers
    /// finish like they would for a real process.
    pub async fn exit(mut self, code: i32) {
        self.stdout.shutdown().await.ok();
        self.stderr.shutdown().await.ok();
        if let Some(tx) = self.exit.take() {
            tx.send(code).ok();
        }
    }
}

/// Runner that hands out fake processes and reports them on a channel.
pub struct FakeRunner {
    spawned_tx: mpsc::UnboundedSender<FakeProcess>,
    /// When set, spawned processes exit with this code on their own shortly
    /// after launch (for tests that don't want to drive the process).
    auto_exit: Option<i32>,
    /// When set, the exit code is delivered before spawn even returns, so
    /// the waiter resolves on its first poll.
    instant_exit: Option<i32>,
    fail_spawn: bool,
}

impl FakeRunner {
    /// Runner whose processes are driven manually through [`FakeProcess`].
    pub fn manual() -> (Arc<Self>, mpsc::UnboundedReceiver<FakeProcess>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                spawned_tx: tx,
                auto_exit: None,
                instant_exit: None,
                fail_spawn: false,
            }),
            rx,
        )
    }

    /// Runner whose processes exit on their own with `code`.
    pub fn auto_exit(code: i32) -> (Arc<Self>, mpsc::UnboundedReceiver<FakeProcess>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                spawned_tx: tx,
                auto_exit: Some(code),
                instant_exit: None,
                fail_spawn: false,
            }),
            rx,
        )
    }

    /// Runner whose processes have already exited with `code` by the time
    /// spawn returns.
    pub fn instant_exit(code: i32) -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            spawned_tx: tx,
            auto_exit: None,
            instant_exit: Some(code),
            fail_spawn: false,
        })
    }

    /// Runner that fails every spawn.
    pub fn failing() -> Arc<Self> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            spawned_tx: tx,
            auto_exit: None,
            instant_exit: None,
            fail_spawn: true,
        })
    }
}

struct FakeSignal {
    interrupted: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
    /// Terminate delivers exit code 143 like a SIGTERM would.
    exit: Mutex<Option<oneshot::Sender<i32>>>,
}

impl ProcessSignal for FakeSignal {
    fn pid(&self) -> Option<u32> {
        None
    }

    fn interrupt(&self) -> std::io::Result<()> {
        self.interrupted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn terminate(&self) -> std::io::Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.exit.try_lock() {
            if let Some(tx) = guard.take() {
                tx.send(143).ok();
            }
        }
        Ok(())
    }

    fn force_kill(&self) -> std::io::Result<()> {
        self.terminate()
    }
}

struct FakeWaiter {
    rx: oneshot::Receiver<i32>,
}

#[async_trait]
impl ProcessWaiter for FakeWaiter {
    async fn wait(&mut self) -> std::io::Result<i32> {
        Ok((&mut self.rx).await.unwrap_or(-1))
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn spawn(&self, spec: &ProcessSpec) -> Result<SpawnedProcess, SessionError> {
        if self.fail_spawn {
            return Err(SessionError::SpawnFailed {
                reason: "scripted spawn failure".to_string(),
            });
        }

        let (stdin_ours, stdin_theirs) = duplex(4096);
        let (stdout_ours, stdout_theirs) = duplex(4096);
        let (stderr_ours, stderr_theirs) = duplex(4096);
        let (exit_tx, exit_rx) = oneshot::channel();
        // Two exit paths: the test body or a terminate signal, whichever
        // fires first.
        let (signal_exit_tx, signal_exit_rx) = oneshot::channel::<i32>();
        let (merged_tx, merged_rx) = oneshot::channel::<i32>();
        tokio::spawn(async move {
            let code = tokio::select! {
                Ok(c) = exit_rx => c,
                Ok(c) = signal_exit_rx => c,
                else => -1,
            };
            merged_tx.send(code).ok();
        });

        let interrupted = Arc::new(AtomicBool::new(false));
        let terminated = Arc::new(AtomicBool::new(false));

        let fake = FakeProcess {
            spec: spec.clone(),
            stdout: stdout_ours,
            stderr: stderr_ours,
            stdin: stdin_ours,
            exit: Some(exit_tx),
            interrupted: Arc::clone(&interrupted),
            terminated: Arc::clone(&terminated),
        };

        if let Some(code) = self.instant_exit {
            fake.exit(code).await;
        } else if let Some(code) = self.auto_exit {
            let mut auto = fake;
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                auto.emit_stdout("working").await;
                auto.exit(code).await;
            });
        } else {
            self.spawned_tx.send(fake).ok();
        }

        Ok(SpawnedProcess {
            stdin: Box::new(stdin_theirs),
            stdout: Box::new(stdout_theirs),
            stderr: Box::new(stderr_theirs),
            signal: Arc::new(FakeSignal {
                interrupted,
                terminated,
                exit: Mutex::new(Some(signal_exit_tx)),
            }),
            waiter: Box::new(FakeWaiter { rx: merged_rx }),
        })
    }
}
