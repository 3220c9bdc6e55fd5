//! One-shot executor: a fresh tmux process per command.
//!
//! No framing is involved. Each invocation's whole stdout is the result and
//! the exit status decides success.

use std::process::Stdio;

use protocol::CommandResponse;
use tokio::process::Command;

use crate::control::SessionError;

/// Runs each command as `program [-L socket] <argv...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotExecutor {
    program: String,
    socket_name: Option<String>,
}

impl OneShotExecutor {
    pub fn new(program: impl Into<String>, socket_name: Option<&str>) -> Self {
        Self {
            program: program.into(),
            socket_name: socket_name.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector for `command`.
    pub fn argv(&self, command: &str) -> Result<Vec<String>, SessionError> {
        let words = shlex::split(command).ok_or_else(|| {
            SessionError::InvalidCommand(format!("unbalanced quoting in: {command}"))
        })?;
        if words.is_empty() {
            return Err(SessionError::InvalidCommand("empty command".to_string()));
        }

        let mut argv = Vec::with_capacity(words.len() + 2);
        if let Some(socket) = &self.socket_name {
            argv.push("-L".to_string());
            argv.push(socket.clone());
        }
        argv.extend(words);
        Ok(argv)
    }

    /// Run `command` and wait for it to finish.
    pub async fn execute(&self, command: &str) -> Result<CommandResponse, SessionError> {
        let argv = self.argv(command)?;
        tracing::debug!(program = %self.program, ?argv, "Running tmux command");

        let output = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if output.status.success() {
            let trimmed = stdout.strip_suffix('\n').unwrap_or(&stdout);
            return Ok(CommandResponse::ok(trimmed));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let error = match stderr.trim() {
            "" => match output.status.code() {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            },
            message => message.to_string(),
        };
        tracing::debug!(error = %error, "tmux command failed");

        Ok(CommandResponse {
            success: false,
            output: stdout,
            error: Some(error),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_argv_splits_quoted_words() {
        let exec = OneShotExecutor::new("tmux", None);
        assert_eq!(
            exec.argv(r#"send-keys -t "mcp:0.0" "echo \"hi\"" Enter"#).unwrap(),
            vec!["send-keys", "-t", "mcp:0.0", r#"echo "hi""#, "Enter"]
        );
    }

    #[test]
    fn test_argv_with_socket() {
        let exec = OneShotExecutor::new("tmux", Some("agents"));
        assert_eq!(
            exec.argv("list-sessions").unwrap(),
            vec!["-L", "agents", "list-sessions"]
        );

        let exec = OneShotExecutor::new("tmux", Some(""));
        assert_eq!(exec.argv("list-sessions").unwrap(), vec!["list-sessions"]);
    }

    #[test]
    fn test_argv_rejects_bad_quoting() {
        let exec = OneShotExecutor::new("tmux", None);
        assert!(matches!(
            exec.argv(r#"send-keys "unterminated"#),
            Err(SessionError::InvalidCommand(_))
        ));
        assert!(matches!(
            exec.argv("   "),
            Err(SessionError::InvalidCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_success_trims_one_newline() {
        let exec = OneShotExecutor::new("printf", None);
        let response = exec.execute(r#""a\n\n""#).await.unwrap();
        assert!(response.success);
        assert_eq!(response.output, "a\n");
        assert_eq!(response.error, None);
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let exec = OneShotExecutor::new("sh", None);
        let response = exec
            .execute(r#"-c "echo partial; echo 'no server running' >&2; exit 1""#)
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.output, "partial\n");
        assert_eq!(response.error.as_deref(), Some("no server running"));
    }

    #[tokio::test]
    async fn test_failure_without_stderr_reports_status() {
        let exec = OneShotExecutor::new("sh", None);
        let response = exec.execute(r#"-c "exit 3""#).await.unwrap();
        assert_eq!(response.error.as_deref(), Some("exit status 3"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let exec = OneShotExecutor::new("/nonexistent/tmux", None);
        assert!(matches!(
            exec.execute("list-sessions").await,
            Err(SessionError::Spawn(_))
        ));
    }
}
