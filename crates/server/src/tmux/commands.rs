//! tmux command builders.
//!
//! Each builder produces one command line, without a trailing newline, that
//! either executor can run. Targets and free text are double-quoted with
//! `"`, `\` and `$` escaped, which both tmux's own parser and POSIX shell
//! splitting undo.

use std::fmt;

use super::types::CreateSessionOptions;

/// `-F` format for `list-sessions`.
pub const SESSION_FORMAT: &str =
    "#{session_id}|#{session_name}|#{session_created}|#{session_attached}";

/// `-F` format for `list-windows`.
pub const WINDOW_FORMAT: &str =
    "#{window_id}|#{window_name}|#{window_active}|#{window_index}|#{window_layout}|#{window_flags}";

/// `-F` format for `list-panes`.
pub const PANE_FORMAT: &str =
    "#{pane_id}|#{pane_active}|#{pane_width}|#{pane_height}|#{pane_current_command}|#{pane_pid}";

/// A tmux command ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxCommand {
    /// The command string (without trailing newline)
    command: String,
}

impl TmuxCommand {
    /// Wrap an arbitrary command line.
    pub fn raw(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.command
    }

    // =========================================================================
    // Session Commands
    // =========================================================================

    /// List all sessions.
    pub fn list_sessions() -> Self {
        Self::raw(format!("list-sessions -F {}", quote(SESSION_FORMAT)))
    }

    /// Create a detached session.
    pub fn new_session(options: &CreateSessionOptions) -> Self {
        let mut command = format!("new-session -d -s {}", quote(&options.name));
        if let Some(width) = options.width {
            command.push_str(&format!(" -x {width}"));
        }
        if let Some(height) = options.height {
            command.push_str(&format!(" -y {height}"));
        }
        if let Some(shell_command) = options.command.as_deref().filter(|c| !c.is_empty()) {
            command.push(' ');
            command.push_str(&quote(shell_command));
        }
        Self::raw(command)
    }

    /// Kill a session.
    pub fn kill_session(session: &str) -> Self {
        Self::raw(format!("kill-session -t {}", quote(session)))
    }

    // =========================================================================
    // Window Commands
    // =========================================================================

    /// List the windows of a session.
    pub fn list_windows(session: &str) -> Self {
        Self::raw(format!(
            "list-windows -t {} -F {}",
            quote(session),
            quote(WINDOW_FORMAT)
        ))
    }

    /// Describe one window.
    pub fn window_info(session: &str, window: &str) -> Self {
        Self::raw(format!(
            "list-windows -t {} -F {}",
            quote(&window_target(session, window)),
            quote(WINDOW_FORMAT)
        ))
    }

    /// Make a window the current one.
    pub fn select_window(session: &str, window: &str) -> Self {
        Self::raw(format!(
            "select-window -t {}",
            quote(&window_target(session, window))
        ))
    }

    pub fn next_window(session: &str) -> Self {
        Self::raw(format!("next-window -t {}", quote(session)))
    }

    pub fn previous_window(session: &str) -> Self {
        Self::raw(format!("previous-window -t {}", quote(session)))
    }

    // =========================================================================
    // Pane Commands
    // =========================================================================

    /// List the panes of a window.
    pub fn list_panes(session: &str, window: &str) -> Self {
        Self::raw(format!(
            "list-panes -t {} -F {}",
            quote(&window_target(session, window)),
            quote(PANE_FORMAT)
        ))
    }

    /// Type `keys` into a pane and press Enter.
    pub fn send_keys(session: &str, window: &str, pane: &str, keys: &str) -> Self {
        Self::raw(format!(
            "send-keys -t {} {} Enter",
            quote(&pane_target(session, window, pane)),
            quote(keys)
        ))
    }

    /// Print the visible contents of a pane.
    pub fn capture_pane(session: &str, window: &str, pane: &str) -> Self {
        Self::raw(format!(
            "capture-pane -p -t {}",
            quote(&pane_target(session, window, pane))
        ))
    }
}

impl fmt::Display for TmuxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)
    }
}

impl AsRef<str> for TmuxCommand {
    fn as_ref(&self) -> &str {
        &self.command
    }
}

fn window_target(session: &str, window: &str) -> String {
    format!("{session}:{window}")
}

fn pane_target(session: &str, window: &str, pane: &str) -> String {
    format!("{session}:{window}.{pane}")
}

/// Double-quote `value` for tmux.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\' | '$') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
