//! tmux MCP server
//!
//! Exposes tmux sessions to MCP clients over stdio.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use server::config::{default_config_path, Config, ExecutionMode, LoggingConfig};
use server::control::TokioProcessHost;
use server::mcp::{McpServer, ServerInfo};
use server::{build_backend, Backend, CommandRunner, TmuxClient, TmuxCommand};
use tokio::io::BufReader;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// tmux MCP server - lets MCP clients drive tmux sessions.
#[derive(Parser, Debug)]
#[command(name = "tmux-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Serve MCP over stdin/stdout
    Serve {
        /// Override the configured execution mode
        #[arg(long, value_enum)]
        mode: Option<ExecutionMode>,
    },

    /// Run one tmux command through the configured backend and print the result
    Exec {
        /// The tmux command, e.g. `list-sessions`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Override the configured execution mode
        #[arg(long, value_enum)]
        mode: Option<ExecutionMode>,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // Load configuration
    let mut config = Config::load(&config_path)?;

    // Apply environment variable overrides
    config.apply_env_overrides();

    let _log_guard = init_logging(&config.logging, cli.verbose)?;
    tracing::debug!("Using config file: {:?}", config_path);

    match cli.command.unwrap_or(Commands::Serve { mode: None }) {
        Commands::Serve { mode } => {
            if let Some(mode) = mode {
                config.tmux.mode = mode;
            }
            config.validate()?;
            serve(config).await
        }
        Commands::Exec { command, mode } => {
            if let Some(mode) = mode {
                config.tmux.mode = mode;
            }
            config.validate()?;
            let succeeded = exec_once(&config, &command.join(" ")).await?;
            if !succeeded {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Config(command) => handle_config_command(command, &config, &config_path),
    }
}

/// Set up tracing. Logs go to stderr, or to `log_file` when configured;
/// stdout carries the MCP protocol.
fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match config.file() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

/// Connect the configured backend and serve MCP until stdin closes or a
/// shutdown signal arrives.
async fn serve(config: Config) -> anyhow::Result<()> {
    tracing::info!(mode = %config.tmux.mode, session = %config.tmux.session_name, "tmux MCP server starting");

    let backend = build_backend(&config.tmux, Arc::new(TokioProcessHost));
    backend
        .connect()
        .await
        .context("Failed to connect to tmux")?;

    let server = McpServer::new(
        TmuxClient::new(backend.clone()),
        ServerInfo {
            name: config.server.name.clone(),
            ..ServerInfo::default()
        },
        config.server.request_timeout(),
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    let result = tokio::select! {
        result = server.serve(stdin, stdout) => result.context("MCP server I/O failed"),
        signal = wait_for_shutdown_signal() => signal
            .context("Failed to listen for shutdown signals")
            .map(|()| tracing::info!("Received shutdown signal")),
    };

    backend.disconnect();
    tracing::info!("tmux MCP server stopped");
    result
}

/// Run one command. Returns whether tmux reported success.
async fn exec_once(config: &Config, command: &str) -> anyhow::Result<bool> {
    let backend: Backend = build_backend(&config.tmux, Arc::new(TokioProcessHost));
    backend
        .connect()
        .await
        .context("Failed to connect to tmux")?;

    let result = backend.run(&TmuxCommand::raw(command)).await;
    backend.disconnect();

    let response = result.with_context(|| format!("Failed to run: {command}"))?;
    if !response.output.is_empty() {
        println!("{}", response.output);
    }
    if !response.success {
        eprintln!("Error: {}", response.error_text());
    }
    Ok(response.success)
}

fn handle_config_command(
    command: ConfigCommands,
    config: &Config,
    path: &std::path::Path,
) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => print!("{}", config.to_toml()?),
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!(
                    "Config file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default().save(path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
