//! Process hosting for the control-mode subprocess.
//!
//! The control session never touches `tokio::process` directly. It asks a
//! [`ProcessHost`] for a [`ProcessHandle`] and only ever sees the handle's
//! streams, its exit notification and its kill switch, which lets tests
//! substitute an in-memory process.

use std::io;
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// Writable half handed to the session (the child's stdin).
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Readable stream handed to the session (the child's stdout or stderr).
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A running subprocess as seen by the control session.
pub struct ProcessHandle {
    /// Operating system process ID, when there is one.
    pub pid: Option<u32>,
    /// The child's standard input.
    pub stdin: BoxedWriter,
    /// The child's standard output.
    pub stdout: BoxedReader,
    /// The child's standard error.
    pub stderr: BoxedReader,
    /// Fires once with the exit code when the process ends.
    pub exited: oneshot::Receiver<Option<i32>>,
    /// Sending on (or dropping) this terminates the process.
    pub kill: oneshot::Sender<()>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Something that can start a subprocess with piped standard streams.
pub trait ProcessHost: Send + Sync {
    /// Start `program` with `args`.
    ///
    /// Must be called from within a tokio runtime.
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<ProcessHandle>;
}

/// [`ProcessHost`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessHost;

impl ProcessHost for TokioProcessHost {
    fn spawn(&self, program: &str, args: &[String]) -> io::Result<ProcessHandle> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin was not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

        let pid = child.id();
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(supervise(child, kill_rx, exit_tx));

        tracing::debug!(program, ?args, pid, "Spawned subprocess");

        Ok(ProcessHandle {
            pid,
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exited: exit_rx,
            kill: kill_tx,
        })
    }
}

/// Own the child until it exits, killing it on request.
async fn supervise(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: oneshot::Sender<Option<i32>>,
) {
    let pid = child.id();

    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            tracing::debug!(pid, "Terminating subprocess");
            if let Err(e) = child.start_kill() {
                tracing::debug!(pid, error = %e, "Kill failed, process already gone");
            }
            child.wait().await
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to reap subprocess");
            None
        }
    };

    // The session may already be gone.
    let _ = exit_tx.send(code);
}
