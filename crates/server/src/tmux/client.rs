//! High-level tmux operations.

use std::str::FromStr;

use protocol::CommandResponse;

use super::commands::TmuxCommand;
use super::types::{CreateSessionOptions, ListingError, TmuxPane, TmuxSession, TmuxWindow};
use super::CommandRunner;
use crate::control::SessionError;

/// tmux operations over a [`CommandRunner`].
///
/// Listings that tmux rejects, or that come back empty, are returned as empty
/// collections. Only channel failures are errors.
#[derive(Debug, Clone)]
pub struct TmuxClient<R> {
    runner: R,
}

impl<R: CommandRunner> TmuxClient<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run an arbitrary command.
    pub async fn execute(&self, command: &TmuxCommand) -> Result<CommandResponse, SessionError> {
        self.runner.run(command).await
    }

    /// Run a listing command and parse each line of its output.
    async fn list<T>(&self, command: TmuxCommand) -> Result<Vec<T>, SessionError>
    where
        T: FromStr<Err = ListingError>,
    {
        let response = self.runner.run(&command).await?;
        if !response.success {
            tracing::debug!(
                command = %command,
                error = response.error_text(),
                "Listing rejected by tmux"
            );
            return Ok(Vec::new());
        }
        Ok(parse_lines(&response.output))
    }

    pub async fn list_sessions(&self) -> Result<Vec<TmuxSession>, SessionError> {
        self.list(TmuxCommand::list_sessions()).await
    }

    /// Windows of `session`, each with its panes.
    pub async fn get_windows(&self, session: &str) -> Result<Vec<TmuxWindow>, SessionError> {
        let mut windows: Vec<TmuxWindow> = self.list(TmuxCommand::list_windows(session)).await?;
        for window in &mut windows {
            window.panes = self.get_panes(session, &window.id).await?;
        }
        Ok(windows)
    }

    pub async fn get_panes(
        &self,
        session: &str,
        window: &str,
    ) -> Result<Vec<TmuxPane>, SessionError> {
        self.list(TmuxCommand::list_panes(session, window)).await
    }

    pub async fn send_keys(
        &self,
        session: &str,
        window: &str,
        pane: &str,
        keys: &str,
    ) -> Result<CommandResponse, SessionError> {
        self.runner
            .run(&TmuxCommand::send_keys(session, window, pane, keys))
            .await
    }

    /// Visible contents of a pane, or an empty string if tmux refused.
    pub async fn capture_pane(
        &self,
        session: &str,
        window: &str,
        pane: &str,
    ) -> Result<String, SessionError> {
        let response = self
            .runner
            .run(&TmuxCommand::capture_pane(session, window, pane))
            .await?;
        Ok(if response.success {
            response.output
        } else {
            String::new()
        })
    }

    pub async fn get_active_window(
        &self,
        session: &str,
    ) -> Result<Option<TmuxWindow>, SessionError> {
        let windows = self.get_windows(session).await?;
        Ok(windows.into_iter().find(|w| w.active))
    }

    pub async fn switch_window(
        &self,
        session: &str,
        window: &str,
    ) -> Result<CommandResponse, SessionError> {
        self.runner
            .run(&TmuxCommand::select_window(session, window))
            .await
    }

    pub async fn next_window(&self, session: &str) -> Result<CommandResponse, SessionError> {
        self.runner.run(&TmuxCommand::next_window(session)).await
    }

    pub async fn previous_window(&self, session: &str) -> Result<CommandResponse, SessionError> {
        self.runner.run(&TmuxCommand::previous_window(session)).await
    }

    /// One window with its panes, if tmux knows it.
    pub async fn get_window_info(
        &self,
        session: &str,
        window: &str,
    ) -> Result<Option<TmuxWindow>, SessionError> {
        let windows: Vec<TmuxWindow> = self
            .list(TmuxCommand::window_info(session, window))
            .await?;
        let Some(mut info) = windows.into_iter().next() else {
            return Ok(None);
        };
        info.panes = self.get_panes(session, &info.id).await?;
        Ok(Some(info))
    }

    pub async fn create_session(
        &self,
        options: &CreateSessionOptions,
    ) -> Result<CommandResponse, SessionError> {
        tracing::info!(name = %options.name, "Creating tmux session");
        self.runner.run(&TmuxCommand::new_session(options)).await
    }

    pub async fn kill_session(&self, name: &str) -> Result<CommandResponse, SessionError> {
        tracing::info!(name, "Killing tmux session");
        self.runner.run(&TmuxCommand::kill_session(name)).await
    }
}

/// Parse every non-empty line, skipping the ones that do not fit.
fn parse_lines<T>(output: &str) -> Vec<T>
where
    T: FromStr<Err = ListingError>,
{
    output
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse() {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!(line, error = %e, "Skipping malformed listing line");
                None
            }
        })
        .collect()
}
