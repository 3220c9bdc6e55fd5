//! Long-lived tmux control-mode session.
//!
//! One subprocess, four tasks:
//!
//! ```text
//!   submit() ──► [registry + writer channel] ──► writer task ──► stdin
//!                                                               tmux -C
//!   caller  ◄── ResponseHandle ◄── registry ◄── reader task ◄── stdout
//!                                              stderr task  ◄── stderr
//!                                              exit watcher ◄── exit
//! ```
//!
//! The registry and the connection state share one mutex, which is never held
//! across an `.await`. Enqueueing and handing the line to the writer happen
//! under that lock, so queue order always equals write order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use protocol::{CommandResponse, FrameParser, ResponseFrame};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::SessionError;
use super::host::{BoxedReader, BoxedWriter, ProcessHandle, ProcessHost};
use super::registry::{PendingRegistry, ResponseHandle};

/// Size of each read from the subprocess output stream.
const READ_CHUNK_SIZE: usize = 8192;

/// Number of stderr lines retained for [`ControlSession::diagnostics`].
const DIAGNOSTIC_HISTORY: usize = 64;

/// Default time allowed for tmux to answer its startup command.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a [`ControlSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Transient while tearing down; collapses back to `Disconnected`.
    Closing,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// How to start the control-mode subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOptions {
    /// Executable to run.
    pub program: String,
    /// Full argument list, including `-C`.
    pub args: Vec<String>,
    /// Frames tmux emits before it starts reading commands.
    pub startup_frames: usize,
    /// Upper bound on waiting for the startup frames.
    pub startup_timeout: Duration,
}

impl ControlOptions {
    /// Options for `tmux [-L socket] -C new-session -A -D -s <session>`.
    ///
    /// `-A` attaches when the session already exists, `-D` detaches other
    /// clients. tmux answers the `new-session` on its own command line with
    /// one frame before it reads stdin.
    pub fn tmux(program: &str, session_name: &str, socket_name: Option<&str>) -> Self {
        let mut args = Vec::new();
        if let Some(socket) = socket_name.filter(|s| !s.is_empty()) {
            args.push("-L".to_string());
            args.push(socket.to_string());
        }
        args.extend(
            ["-C", "new-session", "-A", "-D", "-s", session_name]
                .iter()
                .map(|s| s.to_string()),
        );

        Self {
            program: program.to_string(),
            args,
            startup_frames: 1,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
        }
    }

    /// Override the number of startup frames.
    pub fn with_startup_frames(mut self, frames: usize) -> Self {
        self.startup_frames = frames;
        self
    }

    /// Override the startup timeout.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }
}

/// Handles owned by one live connection.
struct Link {
    pid: Option<u32>,
    writer: mpsc::UnboundedSender<String>,
    kill: Option<oneshot::Sender<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    /// Close the input stream, kill the process and stop the readers.
    fn shut_down(mut self) {
        // Dropping the sender ends the writer task, which shuts stdin down.
        drop(self.writer);
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        for task in self.tasks {
            task.abort();
        }
    }
}

struct Core {
    state: ConnectionState,
    registry: PendingRegistry,
    generation: u64,
    link: Option<Link>,
}

impl Core {
    /// Tear the current link down and fail everything outstanding.
    fn close(&mut self) -> usize {
        self.state = ConnectionState::Closing;
        let rejected = self.registry.reject_all(SessionError::ConnectionClosed);
        if let Some(link) = self.link.take() {
            link.shut_down();
        }
        self.state = ConnectionState::Disconnected;
        rejected
    }
}

/// State shared between the session and its tasks.
struct Shared {
    core: Mutex<Core>,
    diagnostics: Mutex<VecDeque<String>>,
}

impl Shared {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a completed frame to the oldest pending command.
    ///
    /// Returns `false` when the connection that produced it is stale.
    fn deliver(&self, generation: u64, frame: ResponseFrame) -> bool {
        let mut core = self.core();
        if core.generation != generation {
            return false;
        }
        core.registry.resolve_next(frame.into_response());
        true
    }

    /// React to the connection ending on its own.
    fn connection_lost(&self, generation: u64, cause: &str) {
        let mut core = self.core();
        if core.generation != generation || core.link.is_none() {
            return;
        }
        let was = core.state;
        let rejected = core.close();
        tracing::warn!(
            cause,
            previous_state = %was,
            rejected,
            "tmux control connection lost"
        );
    }

    fn record_diagnostic(&self, line: String) {
        let mut ring = self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if ring.len() == DIAGNOSTIC_HISTORY {
            ring.pop_front();
        }
        ring.push_back(line);
    }
}

/// A tmux control-mode connection shared by all callers.
///
/// Commands from concurrent callers are written in submission order and each
/// caller receives the response to its own command.
pub struct ControlSession {
    host: Arc<dyn ProcessHost>,
    options: ControlOptions,
    shared: Arc<Shared>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ControlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlSession")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ControlSession {
    /// Create a disconnected session.
    pub fn new(host: Arc<dyn ProcessHost>, options: ControlOptions) -> Self {
        Self {
            host,
            options,
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: ConnectionState::Disconnected,
                    registry: PendingRegistry::new(),
                    generation: 0,
                    link: None,
                }),
                diagnostics: Mutex::new(VecDeque::with_capacity(DIAGNOSTIC_HISTORY)),
            }),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The options this session starts tmux with.
    pub fn options(&self) -> &ControlOptions {
        &self.options
    }

    /// Start tmux and wait until it is ready for commands.
    ///
    /// Succeeds immediately if already connected. Concurrent calls are
    /// serialized.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let _guard = self.connect_lock.lock().await;

        let (generation, ready_rx) = {
            let mut core = self.shared.core();
            if core.state == ConnectionState::Connected {
                return Ok(());
            }

            core.generation += 1;
            core.state = ConnectionState::Connecting;
            let generation = core.generation;

            tracing::info!(
                program = %self.options.program,
                args = ?self.options.args,
                generation,
                "Starting tmux control mode"
            );

            let handle = match self.host.spawn(&self.options.program, &self.options.args) {
                Ok(handle) => handle,
                Err(e) => {
                    core.state = ConnectionState::Disconnected;
                    tracing::error!(program = %self.options.program, error = %e, "Failed to spawn tmux");
                    return Err(SessionError::Spawn(e.to_string()));
                }
            };

            let (ready_tx, ready_rx) = oneshot::channel();
            core.link = Some(self.start_link(handle, generation, ready_tx));
            (generation, ready_rx)
        };

        let mut abandoned = AbandonedStartup {
            shared: &self.shared,
            generation,
            armed: true,
        };

        let outcome = match tokio::time::timeout(self.options.startup_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(message))) => Err(SessionError::Spawn(message)),
            Ok(Err(_)) => Err(SessionError::Spawn(
                "tmux exited before entering control mode".to_string(),
            )),
            Err(_) => Err(SessionError::Spawn(format!(
                "tmux did not enter control mode within {} ms",
                self.options.startup_timeout.as_millis()
            ))),
        };

        abandoned.armed = false;
        let mut core = self.shared.core();
        let current = core.generation == generation && core.state == ConnectionState::Connecting;

        match outcome {
            Ok(()) if current => {
                core.state = ConnectionState::Connected;
                core.registry.reopen();
                let pid = core.link.as_ref().and_then(|link| link.pid);
                tracing::info!(pid, generation, "Connected to tmux control mode");
                Ok(())
            }
            Ok(()) => Err(SessionError::Spawn(
                "connection closed during startup".to_string(),
            )),
            Err(e) => {
                if current {
                    core.close();
                }
                tracing::error!(error = %e, "tmux control mode startup failed");
                Err(e)
            }
        }
    }

    /// Spawn the tasks that service one connection.
    fn start_link(
        &self,
        handle: ProcessHandle,
        generation: u64,
        ready: oneshot::Sender<Result<(), String>>,
    ) -> Link {
        let ProcessHandle {
            pid,
            stdin,
            stdout,
            stderr,
            exited,
            kill,
        } = handle;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        // The writer is left to drain and close stdin on its own.
        tokio::spawn(write_commands(
            Arc::clone(&self.shared),
            generation,
            stdin,
            writer_rx,
        ));

        let tasks = vec![
            tokio::spawn(read_frames(
                Arc::clone(&self.shared),
                generation,
                stdout,
                Startup::new(self.options.startup_frames, ready),
            )),
            tokio::spawn(read_diagnostics(Arc::clone(&self.shared), stderr)),
            tokio::spawn(watch_exit(Arc::clone(&self.shared), generation, exited)),
        ];

        Link {
            pid,
            writer: writer_tx,
            kill: Some(kill),
            tasks,
        }
    }

    /// Send a command and return the handle that resolves with its response.
    pub fn submit(&self, command: &str) -> Result<ResponseHandle, SessionError> {
        if command.contains(['\n', '\r']) {
            return Err(SessionError::InvalidCommand(
                "command text must be a single line".to_string(),
            ));
        }
        // tmux control mode exits on an empty line.
        if command.trim().is_empty() {
            return Err(SessionError::InvalidCommand(
                "command text is empty".to_string(),
            ));
        }

        let mut core = self.shared.core();
        if core.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        let Core { registry, link, .. } = &mut *core;
        let Some(link) = link.as_ref() else {
            return Err(SessionError::NotConnected);
        };

        let handle = registry.enqueue()?;
        if link.writer.send(format!("{command}\n")).is_err() {
            registry.discard_last(handle.order());
            return Err(SessionError::ConnectionClosed);
        }

        tracing::debug!(order = handle.order(), command, "Submitted tmux command");
        Ok(handle)
    }

    /// Send a command and wait for its response.
    pub async fn execute(&self, command: &str) -> Result<CommandResponse, SessionError> {
        self.submit(command)?.await
    }

    /// Stop tmux and fail every outstanding command. Never fails; repeated
    /// calls are no-ops.
    pub fn disconnect(&self) {
        let mut core = self.shared.core();
        if core.link.is_none() && core.state == ConnectionState::Disconnected {
            return;
        }

        core.generation += 1;
        let rejected = core.close();
        tracing::info!(rejected, "Disconnected from tmux control mode");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.core().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Commands written but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.shared.core().registry.len()
    }

    /// Process ID of the current tmux client, if connected.
    pub fn pid(&self) -> Option<u32> {
        self.shared.core().link.as_ref().and_then(|link| link.pid)
    }

    /// Most recent lines tmux wrote to stderr, oldest first.
    pub fn diagnostics(&self) -> Vec<String> {
        self.shared
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Tears down a startup whose `connect()` future was dropped mid-wait.
struct AbandonedStartup<'a> {
    shared: &'a Shared,
    generation: u64,
    armed: bool,
}

impl Drop for AbandonedStartup<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut core = self.shared.core();
        if core.generation == self.generation && core.state == ConnectionState::Connecting {
            core.close();
            tracing::warn!(generation = self.generation, "tmux startup abandoned");
        }
    }
}

/// Tracks the frames tmux sends before it reads stdin.
struct Startup {
    remaining: usize,
    ready: Option<oneshot::Sender<Result<(), String>>>,
}

impl Startup {
    fn new(frames: usize, ready: oneshot::Sender<Result<(), String>>) -> Self {
        let mut startup = Self {
            remaining: frames,
            ready: Some(ready),
        };
        if frames == 0 {
            startup.signal(Ok(()));
        }
        startup
    }

    fn signal(&mut self, outcome: Result<(), String>) {
        if let Some(ready) = self.ready.take() {
            let _ = ready.send(outcome);
        }
    }

    /// Consume `frame` if it belongs to startup.
    fn absorb(&mut self, frame: &ResponseFrame) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;

        match &frame.error {
            Some(error) => {
                tracing::warn!(error = %error, "tmux rejected its startup command");
                self.signal(Err(error.clone()));
            }
            None if self.remaining == 0 => self.signal(Ok(())),
            None => {}
        }
        true
    }
}

async fn write_commands(
    shared: Arc<Shared>,
    generation: u64,
    mut stdin: BoxedWriter,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = lines.recv().await {
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::error!(error = %e, "Failed to write to tmux stdin");
            shared.connection_lost(generation, "write failed");
            return;
        }
    }

    if let Err(e) = stdin.shutdown().await {
        tracing::debug!(error = %e, "Failed to close tmux stdin");
    }
}

async fn read_frames(
    shared: Arc<Shared>,
    generation: u64,
    mut stdout: BoxedReader,
    mut startup: Startup,
) {
    let mut parser = FrameParser::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => {
                tracing::debug!("tmux stdout closed");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read tmux stdout");
                break;
            }
        };
        tracing::trace!(bytes = n, "Read from tmux");

        for item in parser.feed(&chunk[..n]) {
            match item {
                Ok(frame) => {
                    if startup.absorb(&frame) {
                        continue;
                    }
                    if !shared.deliver(generation, frame) {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding malformed control-mode output");
                }
            }
        }
    }

    if startup.ready.is_some() {
        startup.signal(Err("tmux closed its output during startup".to_string()));
    }
    shared.connection_lost(generation, "output stream closed");
}

async fn read_diagnostics(shared: Arc<Shared>, stderr: BoxedReader) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\n', '\r']);
                tracing::warn!(stderr = %line, "tmux diagnostic");
                shared.record_diagnostic(line.to_string());
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stopped reading tmux stderr");
                break;
            }
        }
    }
}

async fn watch_exit(
    shared: Arc<Shared>,
    generation: u64,
    exited: oneshot::Receiver<Option<i32>>,
) {
    let code = exited.await.ok().flatten();
    tracing::info!(?code, "tmux process exited");
    shared.connection_lost(generation, "process exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use tokio::io::{duplex, AsyncBufReadExt, DuplexStream};

    /// The far side of an in-memory process.
    struct FakeProcess {
        stdin: tokio::io::Lines<BufReader<DuplexStream>>,
        stdout: DuplexStream,
        stderr: DuplexStream,
        exit: Option<oneshot::Sender<Option<i32>>>,
        killed: oneshot::Receiver<()>,
    }

    impl FakeProcess {
        async fn emit(&mut self, text: &str) {
            self.stdout.write_all(text.as_bytes()).await.unwrap();
        }

        async fn next_command(&mut self) -> String {
            self.stdin.next_line().await.unwrap().unwrap()
        }
    }

    #[derive(Default)]
    struct FakeHost {
        spawned: Mutex<Vec<FakeProcess>>,
        fail: bool,
    }

    impl FakeHost {
        fn take(&self) -> FakeProcess {
            self.spawned.lock().unwrap().remove(0)
        }
    }

    impl ProcessHost for FakeHost {
        fn spawn(&self, _program: &str, _args: &[String]) -> io::Result<ProcessHandle> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such program"));
            }
            let (stdin_ours, stdin_theirs) = duplex(4096);
            let (stdout_ours, stdout_theirs) = duplex(4096);
            let (stderr_ours, stderr_theirs) = duplex(4096);
            let (exit_tx, exit_rx) = oneshot::channel();
            let (kill_tx, kill_rx) = oneshot::channel();

            self.spawned.lock().unwrap().push(FakeProcess {
                stdin: BufReader::new(stdin_theirs).lines(),
                stdout: stdout_theirs,
                stderr: stderr_theirs,
                exit: Some(exit_tx),
                killed: kill_rx,
            });

            Ok(ProcessHandle {
                pid: Some(4242),
                stdin: Box::new(stdin_ours),
                stdout: Box::new(stdout_ours),
                stderr: Box::new(stderr_ours),
                exited: exit_rx,
                kill: kill_tx,
            })
        }
    }

    fn options(startup_frames: usize) -> ControlOptions {
        ControlOptions::tmux("tmux", "mcp", None)
            .with_startup_frames(startup_frames)
            .with_startup_timeout(Duration::from_secs(2))
    }

    async fn connected(host: &Arc<FakeHost>) -> (ControlSession, FakeProcess) {
        let session = ControlSession::new(host.clone(), options(0));
        session.connect().await.unwrap();
        (session, host.take())
    }

    #[test]
    fn test_tmux_options_arguments() {
        let opts = ControlOptions::tmux("tmux", "work", None);
        assert_eq!(
            opts.args,
            vec!["-C", "new-session", "-A", "-D", "-s", "work"]
        );
        assert_eq!(opts.startup_frames, 1);

        let opts = ControlOptions::tmux("/usr/bin/tmux", "work", Some("sock"));
        assert_eq!(opts.program, "/usr/bin/tmux");
        assert_eq!(&opts.args[..3], &["-L", "sock", "-C"]);

        let opts = ControlOptions::tmux("tmux", "work", Some(""));
        assert_eq!(opts.args[0], "-C");
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[tokio::test]
    async fn test_execute_before_connect_is_not_connected() {
        let host = Arc::new(FakeHost::default());
        let session = ControlSession::new(host, options(0));

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(
            session.execute("list-sessions").await.unwrap_err(),
            SessionError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let host = Arc::new(FakeHost {
            fail: true,
            ..Default::default()
        });
        let session = ControlSession::new(host, options(0));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(ref msg) if msg.contains("no such program")));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_single_command_round_trip() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;
        assert!(session.is_connected());
        assert_eq!(session.pid(), Some(4242));

        let handle = session.submit("list-sessions").unwrap();
        assert_eq!(tmux.next_command().await, "list-sessions");

        tmux.emit("%begin 0\n").await;
        tmux.emit("0: mcp: 1 windows\n%end 0\n").await;

        let response = handle.await.unwrap();
        assert!(response.success);
        assert_eq!(response.output, "0: mcp: 1 windows");
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_inline_error_frame() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        let handle = session.submit("bogus").unwrap();
        tmux.emit("%begin 1\n%error invalid command\n%end 1\n").await;

        let response = handle.await.unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("invalid command"));
    }

    #[tokio::test]
    async fn test_back_to_back_frames_resolve_in_order() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        let first = session.submit("display -p one").unwrap();
        let second = session.submit("display -p two").unwrap();
        assert_eq!(session.pending_count(), 2);

        tmux.emit("%begin 5\none\n%end 5\n%begin 6\ntwo\n%end 6\n").await;

        assert_eq!(first.await.unwrap().output, "one");
        assert_eq!(second.await.unwrap().output, "two");
    }

    #[tokio::test]
    async fn test_exit_rejects_outstanding_and_blocks_new_commands() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        let handle = session.submit("list-windows").unwrap();
        tmux.exit.take().unwrap().send(Some(0)).unwrap();

        assert_eq!(handle.await.unwrap_err(), SessionError::ConnectionClosed);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(
            session.execute("list-windows").await.unwrap_err(),
            SessionError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_stdout_eof_closes_connection() {
        let host = Arc::new(FakeHost::default());
        let (session, tmux) = connected(&host).await;

        let handle = session.submit("list-windows").unwrap();
        drop(tmux.stdout);

        assert_eq!(handle.await.unwrap_err(), SessionError::ConnectionClosed);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_kills() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        let handle = session.submit("list-sessions").unwrap();
        session.disconnect();
        session.disconnect();

        assert_eq!(handle.await.unwrap_err(), SessionError::ConnectionClosed);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!((&mut tmux.killed).await.is_ok());

        // The writer closed stdin after the queued line.
        assert_eq!(tmux.next_command().await, "list-sessions");
        assert!(tmux.stdin.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_multiline_command_rejected() {
        let host = Arc::new(FakeHost::default());
        let (session, _tmux) = connected(&host).await;

        let err = session.submit("list-sessions\nkill-server").unwrap_err();
        assert!(matches!(err, SessionError::InvalidCommand(_)));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        for blank in ["", "   ", "\t"] {
            let err = session.submit(blank).unwrap_err();
            assert!(matches!(err, SessionError::InvalidCommand(_)));
        }
        assert_eq!(session.pending_count(), 0);

        // Nothing reached tmux and the connection is still usable.
        let handle = session.submit("display -p alive").unwrap();
        assert_eq!(tmux.next_command().await, "display -p alive");
        tmux.emit("%begin 2\nalive\n%end 2\n").await;
        assert_eq!(handle.await.unwrap().output, "alive");
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_startup_frame_is_not_delivered() {
        let host = Arc::new(FakeHost::default());
        let session = Arc::new(ControlSession::new(host.clone(), options(1)));

        let connecting = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.connect().await }
        });

        // Wait for the spawn to happen.
        let mut tmux = loop {
            if let Some(process) = host.spawned.lock().unwrap().pop() {
                break process;
            }
            tokio::task::yield_now().await;
        };

        tmux.emit("%begin 100 0 0\n%end 100 0 0\n").await;
        connecting.await.unwrap().unwrap();
        assert!(session.is_connected());

        let handle = session.submit("display -p hi").unwrap();
        tmux.emit("%begin 101 0 1\nhi\n%end 101 0 1\n").await;
        assert_eq!(handle.await.unwrap().output, "hi");
    }

    #[tokio::test]
    async fn test_startup_error_fails_connect() {
        let host = Arc::new(FakeHost::default());
        let session = Arc::new(ControlSession::new(host.clone(), options(1)));

        let connecting = tokio::spawn({
            let session = Arc::clone(&session);
            async move { session.connect().await }
        });

        let mut tmux = loop {
            if let Some(process) = host.spawned.lock().unwrap().pop() {
                break process;
            }
            tokio::task::yield_now().await;
        };

        tmux.emit("%begin 1 0 0\nsessions should be nested with care\n%error 1 0 0\n")
            .await;

        let err = connecting.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            SessionError::Spawn("sessions should be nested with care".to_string())
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_timeout() {
        let host = Arc::new(FakeHost::default());
        let session = ControlSession::new(host.clone(), options(1));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn(ref msg) if msg.contains("within")));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_twice_is_noop() {
        let host = Arc::new(FakeHost::default());
        let (session, _tmux) = connected(&host).await;

        session.connect().await.unwrap();
        assert!(host.spawned.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_after_disconnect() {
        let host = Arc::new(FakeHost::default());
        let (session, _old) = connected(&host).await;

        session.disconnect();
        session.connect().await.unwrap();
        let mut tmux = host.take();

        let handle = session.submit("list-sessions").unwrap();
        tmux.emit("%begin 0\nmcp\n%end 0\n").await;
        assert_eq!(handle.await.unwrap().output, "mcp");
    }

    #[tokio::test]
    async fn test_stderr_is_collected() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        tmux.stderr.write_all(b"warning: odd terminal\n").await.unwrap();

        for _ in 0..100 {
            if !session.diagnostics().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(session.diagnostics(), vec!["warning: odd terminal"]);
    }

    #[tokio::test]
    async fn test_stderr_survives_invalid_utf8() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        tmux.stderr.write_all(b"bad \xff byte\n").await.unwrap();
        tmux.stderr.write_all(b"second line\r\n").await.unwrap();

        for _ in 0..100 {
            if session.diagnostics().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(
            session.diagnostics(),
            vec!["bad \u{FFFD} byte", "second line"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connect_cleans_up() {
        let host = Arc::new(FakeHost::default());
        let session = ControlSession::new(host.clone(), options(1));

        let attempt = tokio::time::timeout(Duration::from_millis(50), session.connect()).await;
        assert!(attempt.is_err());
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(session.pid(), None);

        let mut tmux = host.take();
        assert!((&mut tmux.killed).await.is_ok());

        // A fresh attempt starts a new process.
        let (result, _tmux) = tokio::join!(session.connect(), async {
            let mut tmux = loop {
                if let Some(process) = host.spawned.lock().unwrap().pop() {
                    break process;
                }
                tokio::task::yield_now().await;
            };
            tmux.emit("%begin 1 0 0\n%end 1 0 0\n").await;
            tmux
        });
        result.unwrap();
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_stray_markers_do_not_derail_session() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        let handle = session.submit("display -p ok").unwrap();
        tmux.emit("%end 9\n%error 9\n%begin 7\npartial\n%begin 1\nok\n%end 1\n")
            .await;

        assert_eq!(handle.await.unwrap().output, "ok");
        assert!(session.is_connected());
        assert_eq!(session.pending_count(), 0);

        let next = session.submit("display -p next").unwrap();
        tmux.emit("%begin 2\nnext\n%end 2\n").await;
        assert_eq!(next.await.unwrap().output, "next");
    }

    #[tokio::test]
    async fn test_noise_between_frames_is_ignored() {
        let host = Arc::new(FakeHost::default());
        let (session, mut tmux) = connected(&host).await;

        let handle = session.submit("list-sessions").unwrap();
        tmux.emit("%session-changed $1 mcp\n%window-add @2\n%begin 3\nok\n%end 3\n")
            .await;

        assert_eq!(handle.await.unwrap().output, "ok");
    }
}
