//! tmux control-mode client.
//!
//! - [`host`]: spawning the subprocess behind a [`ProcessHost`] seam
//! - [`registry`]: FIFO matching of response frames to submitted commands
//! - [`session`]: the connection state machine and its I/O tasks

pub mod error;
pub mod host;
pub mod registry;
pub mod session;

pub use error::SessionError;
pub use host::{BoxedReader, BoxedWriter, ProcessHandle, ProcessHost, TokioProcessHost};
pub use registry::{Completion, PendingRegistry, ResponseHandle};
pub use session::{ConnectionState, ControlOptions, ControlSession, DEFAULT_STARTUP_TIMEOUT};
