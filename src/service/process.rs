//! Backend process ownership: spawning, exit tracking and teardown.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};

pub type ExitCallback = Box<dyn FnOnce(Option<ExitStatus>) + Send + 'static>;

/// The standard streams of a freshly spawned backend.
#[derive(Debug)]
pub struct ProcessStreams {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Handle to a running backend process.
///
/// The `Child` itself lives in a supervisor task that waits for it to exit,
/// so exit is observed even when nobody is reading from the process.
pub struct ChildProcess {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
    killed: AtomicBool,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    exit_rx: watch::Receiver<Option<Option<ExitStatus>>>,
}

impl ChildProcess {
    /// Spawn `program` with piped stdio. Must be called within a tokio runtime.
    pub fn spawn(
        working_dir: Option<&Path>,
        program: &str,
        args: &[String],
        on_exit: ExitCallback,
    ) -> Result<(Self, ProcessStreams)> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Spawn {
                program: program.to_string(),
                source,
            })?;

        let streams = ProcessStreams {
            stdin: take_stream(child.stdin.take(), program, "stdin")?,
            stdout: take_stream(child.stdout.take(), program, "stdout")?,
            stderr: take_stream(child.stderr.take(), program, "stderr")?,
        };

        let pid = child.id();
        tracing::debug!(pid = ?pid, program, "spawned backend process");

        let exited = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(supervise(child, kill_rx, exited.clone(), exit_tx, on_exit));

        Ok((
            ChildProcess {
                pid,
                exited,
                killed: AtomicBool::new(false),
                kill_tx: Mutex::new(Some(kill_tx)),
                exit_rx,
            },
            streams,
        ))
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Terminate the process unless it already exited or was already
    /// killed. Returns whether a kill was issued.
    pub fn kill(&self) -> bool {
        if self.has_exited() || self.killed.swap(true, Ordering::SeqCst) {
            return false;
        }
        match self.kill_tx.lock().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Wait for the process to exit. Returns `None` when the exit status
    /// could not be collected.
    pub async fn wait(&self) -> Option<ExitStatus> {
        let mut rx = self.exit_rx.clone();
        // The borrow guard must drop before `rx` does.
        let status = match rx.wait_for(|status| status.is_some()).await {
            Ok(status) => (*status).flatten(),
            Err(_) => None,
        };
        status
    }
}

impl std::fmt::Debug for ChildProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcess")
            .field("pid", &self.pid)
            .field("exited", &self.has_exited())
            .field("killed", &self.is_killed())
            .finish()
    }
}

async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exited: Arc<AtomicBool>,
    exit_tx: watch::Sender<Option<Option<ExitStatus>>>,
    on_exit: ExitCallback,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        Ok(()) = kill_rx => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("failed to kill backend process: {}", e);
            }
            child.wait().await
        }
    };

    let status = match status {
        Ok(status) => {
            tracing::debug!(%status, "backend process exited");
            Some(status)
        }
        Err(e) => {
            tracing::warn!("failed to wait for backend process: {}", e);
            None
        }
    };

    exited.store(true, Ordering::SeqCst);
    on_exit(status);
    let _ = exit_tx.send(Some(status));
}

fn take_stream<T>(stream: Option<T>, program: &str, name: &str) -> Result<T> {
    stream.ok_or_else(|| Error::Spawn {
        program: program.to_string(),
        source: std::io::Error::other(format!("failed to take child {}", name)),
    })
}
