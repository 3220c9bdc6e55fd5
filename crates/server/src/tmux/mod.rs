//! tmux operations on top of either executor.
//!
//! [`CommandRunner`] is the seam: [`ControlSession`] and [`OneShotExecutor`]
//! both run a [`TmuxCommand`] and produce a [`CommandResponse`], and
//! [`TmuxClient`] builds the higher-level listing and control operations on
//! whichever one it is given.

pub mod client;
pub mod commands;
pub mod types;

use std::sync::Arc;

use protocol::CommandResponse;

use crate::control::{ControlSession, SessionError};
use crate::exec::OneShotExecutor;

pub use client::TmuxClient;
pub use commands::TmuxCommand;
pub use types::{CreateSessionOptions, ListingError, TmuxPane, TmuxSession, TmuxWindow};

/// Something that can run a tmux command.
#[allow(async_fn_in_trait)]
pub trait CommandRunner: Send + Sync {
    /// Run `command`.
    ///
    /// A command tmux rejects still returns `Ok` with `success == false`.
    /// `Err` is reserved for failures of the channel itself.
    async fn run(&self, command: &TmuxCommand) -> Result<CommandResponse, SessionError>;
}

impl CommandRunner for ControlSession {
    async fn run(&self, command: &TmuxCommand) -> Result<CommandResponse, SessionError> {
        self.execute(command.as_str()).await
    }
}

impl CommandRunner for OneShotExecutor {
    async fn run(&self, command: &TmuxCommand) -> Result<CommandResponse, SessionError> {
        self.execute(command.as_str()).await
    }
}

impl<R: CommandRunner> CommandRunner for Arc<R> {
    async fn run(&self, command: &TmuxCommand) -> Result<CommandResponse, SessionError> {
        (**self).run(command).await
    }
}

/// The executor selected by configuration.
#[derive(Debug, Clone)]
pub enum Backend {
    Control(Arc<ControlSession>),
    OneShot(OneShotExecutor),
}

impl Backend {
    /// The control session, if this backend uses one.
    pub fn control_session(&self) -> Option<&Arc<ControlSession>> {
        match self {
            Backend::Control(session) => Some(session),
            Backend::OneShot(_) => None,
        }
    }

    /// Bring the backend up. A no-op for the one-shot executor.
    pub async fn connect(&self) -> Result<(), SessionError> {
        match self {
            Backend::Control(session) => session.connect().await,
            Backend::OneShot(_) => Ok(()),
        }
    }

    /// Release the backend. A no-op for the one-shot executor.
    pub fn disconnect(&self) {
        if let Backend::Control(session) = self {
            session.disconnect();
        }
    }
}

impl CommandRunner for Backend {
    async fn run(&self, command: &TmuxCommand) -> Result<CommandResponse, SessionError> {
        match self {
            Backend::Control(session) => session.run(command).await,
            Backend::OneShot(exec) => exec.run(command).await,
        }
    }
}
