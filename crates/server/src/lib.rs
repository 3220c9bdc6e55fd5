//! # tmux MCP Server Library
//!
//! Drives tmux for a calling agent, either through one long-lived control-mode
//! client (`tmux -C`) or by spawning a tmux process per command, and exposes
//! sessions, windows and panes over the Model Context Protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  MCP Server (JSON-RPC over stdio)               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │          TmuxClient (listings, keys, capture, ...)         │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! │                      CommandRunner backend                      │
//! │  ┌──────────────────────────────┐  ┌─────────────────────────┐  │
//! │  │        ControlSession        │  │    OneShotExecutor      │  │
//! │  │  registry · frame parser ·   │  │  shlex argv, one tmux   │  │
//! │  │  writer / reader tasks       │  │  process per command    │  │
//! │  └──────────────┬───────────────┘  └─────────────────────────┘  │
//! │                 │ ProcessHost                                   │
//! └─────────────────┼───────────────────────────────────────────────┘
//!                   ▼
//!                tmux -C
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use server::control::{ControlOptions, ControlSession, TokioProcessHost};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = ControlSession::new(
//!         Arc::new(TokioProcessHost),
//!         ControlOptions::tmux("tmux", "mcp", None),
//!     );
//!     session.connect().await?;
//!
//!     let response = session.execute("list-windows").await?;
//!     println!("{}", response.output);
//!
//!     session.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`control`]: The control-mode session, its registry and process host
//! - [`exec`]: One-shot executor
//! - [`tmux`]: Command builders, object model and the high-level client
//! - [`mcp`]: The MCP server

pub mod config;
pub mod control;
pub mod exec;
pub mod mcp;
pub mod tmux;

use std::sync::Arc;

pub use config::{Config, ExecutionMode};
pub use control::{ConnectionState, ControlOptions, ControlSession, SessionError};
pub use exec::OneShotExecutor;
pub use tmux::{Backend, CommandRunner, TmuxClient, TmuxCommand};

use config::TmuxConfig;
use control::ProcessHost;

/// Build the configured backend. Nothing is started yet.
pub fn build_backend(config: &TmuxConfig, host: Arc<dyn ProcessHost>) -> Backend {
    match config.mode {
        ExecutionMode::Control => {
            let options =
                ControlOptions::tmux(&config.program, &config.session_name, config.socket())
                    .with_startup_frames(config.startup_frames)
                    .with_startup_timeout(config.startup_timeout());
            Backend::Control(Arc::new(ControlSession::new(host, options)))
        }
        ExecutionMode::Oneshot => {
            Backend::OneShot(OneShotExecutor::new(&config.program, config.socket()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use control::TokioProcessHost;
    use std::time::Duration;

    #[test]
    fn test_build_control_backend() {
        let mut config = TmuxConfig::default();
        config.socket_name = "agents".to_string();
        config.startup_frames = 2;
        config.startup_timeout_ms = 750;

        let backend = build_backend(&config, Arc::new(TokioProcessHost));
        let session = backend.control_session().unwrap();
        let options = session.options();

        assert_eq!(options.program, "tmux");
        assert_eq!(
            options.args,
            vec!["-L", "agents", "-C", "new-session", "-A", "-D", "-s", "mcp"]
        );
        assert_eq!(options.startup_frames, 2);
        assert_eq!(options.startup_timeout, Duration::from_millis(750));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_build_oneshot_backend() {
        let mut config = TmuxConfig::default();
        config.mode = ExecutionMode::Oneshot;

        let backend = build_backend(&config, Arc::new(TokioProcessHost));
        assert!(backend.control_session().is_none());
        match backend {
            Backend::OneShot(exec) => assert_eq!(exec.program(), "tmux"),
            Backend::Control(_) => panic!("Expected one-shot backend"),
        }
    }
}
