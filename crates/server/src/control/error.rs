//! Errors surfaced by the tmux command executors.

use thiserror::Error;

/// Channel-level failures of a tmux executor.
///
/// A command that tmux itself rejects is not an error here: it completes
/// normally with `CommandResponse::success == false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The tmux process could not be started or never entered control mode.
    #[error("failed to start tmux: {0}")]
    Spawn(String),

    /// A command was submitted while the session was not connected.
    #[error("not connected to tmux")]
    NotConnected,

    /// The session closed before the command's response arrived.
    #[error("connection to tmux closed")]
    ConnectionClosed,

    /// The command text cannot be sent as a single control-mode line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// I/O error while running a one-shot command.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err.to_string())
    }
}

impl SessionError {
    /// Whether the error means the channel to tmux is gone, as opposed to a
    /// problem with one particular command.
    pub fn is_channel_failure(&self) -> bool {
        matches!(
            self,
            SessionError::Spawn(_) | SessionError::NotConnected | SessionError::ConnectionClosed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display() {
        let err = SessionError::Spawn("No such file or directory".to_string());
        assert_eq!(err.to_string(), "failed to start tmux: No such file or directory");
    }

    #[test]
    fn test_not_connected_display() {
        assert_eq!(SessionError::NotConnected.to_string(), "not connected to tmux");
    }

    #[test]
    fn test_connection_closed_display() {
        assert_eq!(
            SessionError::ConnectionClosed.to_string(),
            "connection to tmux closed"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: SessionError = io_err.into();
        assert_eq!(err, SessionError::Io("pipe closed".to_string()));
    }

    #[test]
    fn test_channel_failure_classification() {
        assert!(SessionError::NotConnected.is_channel_failure());
        assert!(SessionError::ConnectionClosed.is_channel_failure());
        assert!(SessionError::Spawn(String::new()).is_channel_failure());
        assert!(!SessionError::InvalidCommand("a\nb".to_string()).is_channel_failure());
        assert!(!SessionError::Io("x".to_string()).is_channel_failure());
    }
}
