//! Configuration management for the tmux MCP server.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/tmux-mcp/config.toml`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("tmux program not found: {0}")]
    InvalidProgram(String),

    #[error("session_name must be non-empty and must not contain ':' or '.', got {0:?}")]
    InvalidSessionName(String),

    #[error("startup_timeout_ms must be between 1 and 60000, got {0}")]
    InvalidStartupTimeout(u64),

    #[error("request_timeout_ms must be between 1 and 600000, got {0}")]
    InvalidRequestTimeout(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// How tmux commands are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One long-lived `tmux -C` client shared by every request.
    #[default]
    Control,
    /// A fresh `tmux` process per command.
    Oneshot,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Control => f.write_str("control"),
            ExecutionMode::Oneshot => f.write_str("oneshot"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "control" => Ok(ExecutionMode::Control),
            "oneshot" | "one-shot" => Ok(ExecutionMode::Oneshot),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// How to reach tmux.
    pub tmux: TmuxConfig,

    /// MCP server settings.
    pub server: ServerConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// tmux connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TmuxConfig {
    /// Executable name or absolute path.
    pub program: String,

    /// Session the control-mode client attaches to.
    pub session_name: String,

    /// Optional `-L` socket name. Empty selects the default server.
    pub socket_name: String,

    /// Control mode or one process per command.
    pub mode: ExecutionMode,

    /// Frames tmux emits before it reads commands.
    pub startup_frames: usize,

    /// How long to wait for control mode to come up.
    pub startup_timeout_ms: u64,
}

/// MCP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Name reported in the `initialize` response.
    pub name: String,

    /// Upper bound on the tmux work done for a single request.
    pub request_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log file path. Empty logs to stderr.
    pub log_file: String,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            program: "tmux".to_string(),
            session_name: "mcp".to_string(),
            socket_name: String::new(),
            mode: ExecutionMode::Control,
            startup_frames: 1,
            startup_timeout_ms: 5000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "mcp-tmux-server".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: String::new(),
        }
    }
}

impl TmuxConfig {
    /// The socket name, if one is configured.
    pub fn socket(&self) -> Option<&str> {
        Some(self.socket_name.as_str()).filter(|s| !s.is_empty())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl LoggingConfig {
    /// The log file, if one is configured.
    pub fn file(&self) -> Option<&Path> {
        Some(self.log_file.as_str())
            .filter(|s| !s.is_empty())
            .map(Path::new)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tmux-mcp")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - TMUX_MCP_PROGRAM: Override the tmux executable
    /// - TMUX_MCP_MODE: Override the execution mode (control, oneshot)
    /// - TMUX_MCP_SESSION: Override the control-mode session name
    /// - TMUX_MCP_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(program) = std::env::var("TMUX_MCP_PROGRAM") {
            if !program.is_empty() {
                tracing::info!("Overriding tmux program from environment: {}", program);
                self.tmux.program = program;
            }
        }

        if let Ok(mode) = std::env::var("TMUX_MCP_MODE") {
            if !mode.is_empty() {
                match mode.parse::<ExecutionMode>() {
                    Ok(mode) => {
                        tracing::info!("Overriding execution mode from environment: {}", mode);
                        self.tmux.mode = mode;
                    }
                    Err(e) => tracing::warn!("Ignoring TMUX_MCP_MODE: {}", e),
                }
            }
        }

        if let Ok(session) = std::env::var("TMUX_MCP_SESSION") {
            if !session.is_empty() {
                tracing::info!("Overriding session_name from environment: {}", session);
                self.tmux.session_name = session;
            }
        }

        if let Ok(level) = std::env::var("TMUX_MCP_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The tmux program must be runnable
        let program = Path::new(&self.tmux.program);
        if program.is_absolute() {
            if !program.exists() {
                return Err(ConfigError::InvalidProgram(self.tmux.program.clone()));
            }
        } else if which::which(&self.tmux.program).is_err() {
            return Err(ConfigError::InvalidProgram(self.tmux.program.clone()));
        }

        // ':' and '.' are target separators in tmux
        let name = &self.tmux.session_name;
        if name.is_empty() || name.contains([':', '.']) {
            return Err(ConfigError::InvalidSessionName(name.clone()));
        }

        if !(1..=60_000).contains(&self.tmux.startup_timeout_ms) {
            return Err(ConfigError::InvalidStartupTimeout(
                self.tmux.startup_timeout_ms,
            ));
        }

        if !(1..=600_000).contains(&self.server.request_timeout_ms) {
            return Err(ConfigError::InvalidRequestTimeout(
                self.server.request_timeout_ms,
            ));
        }

        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
