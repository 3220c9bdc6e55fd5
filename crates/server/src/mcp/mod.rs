//! MCP (Model Context Protocol) server over stdio.
//!
//! Reads line-delimited JSON-RPC 2.0 and writes one response line per
//! request. tmux sessions are exposed as `tmux://<name>` resources, and
//! session management actions as tools.
//!
//! # Module layout
//!
//! - [`jsonrpc`]: wire types, response helpers and output framing
//! - [`resources`]: `resources/list` and `resources/read`
//! - [`tools`]: tool descriptors and `tools/call` dispatch

pub mod jsonrpc;
pub mod resources;
pub mod tools;

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

use crate::control::SessionError;
use crate::tmux::{CommandRunner, TmuxClient};
use jsonrpc::{
    error_response, method_not_found, parse_error, success_response, write_response,
    IncomingMessage, Response, INTERNAL_ERROR, INVALID_PARAMS,
};

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Failures of a resource request.
#[derive(Debug, Error, PartialEq)]
pub enum McpError {
    #[error("{0}")]
    InvalidParams(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),
}

impl McpError {
    /// JSON-RPC error code for this failure.
    pub fn code(&self) -> i64 {
        match self {
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::Session(_) | McpError::Timeout(_) => INTERNAL_ERROR,
        }
    }
}

/// Identity reported in the `initialize` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "mcp-tmux-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// The MCP request handler.
pub struct McpServer<R> {
    client: TmuxClient<R>,
    info: ServerInfo,
    request_timeout: Duration,
}

impl<R: CommandRunner> McpServer<R> {
    pub fn new(client: TmuxClient<R>, info: ServerInfo, request_timeout: Duration) -> Self {
        Self {
            client,
            info,
            request_timeout,
        }
    }

    pub fn client(&self) -> &TmuxClient<R> {
        &self.client
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "resources": {},
                "tools": {}
            },
            "serverInfo": {
                "name": self.info.name,
                "version": self.info.version
            }
        })
    }

    /// Run `work` under the per-request timeout.
    async fn bounded<T, F>(&self, work: F) -> Result<T, McpError>
    where
        F: std::future::Future<Output = Result<T, McpError>>,
    {
        tokio::time::timeout(self.request_timeout, work)
            .await
            .unwrap_or(Err(McpError::Timeout(self.request_timeout)))
    }

    /// Handle one raw input line. Returns `None` when no response is due.
    pub async fn handle_line(&self, line: &str) -> Option<Response> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        tracing::debug!(request = trimmed, "MCP <-");

        let msg: IncomingMessage = match serde_json::from_str(trimmed) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "Unparseable MCP message");
                return Some(parse_error());
            }
        };

        self.handle_message(msg).await
    }

    /// Handle one decoded message.
    pub async fn handle_message(&self, msg: IncomingMessage) -> Option<Response> {
        let Some(method) = msg.method.as_deref() else {
            tracing::debug!("Ignoring message without method");
            return None;
        };

        // Notifications get no response.
        let Some(id) = msg.id else {
            tracing::debug!(method, "MCP notification");
            return None;
        };

        let params = msg.params.as_ref();
        let response = match method {
            "initialize" => success_response(id, self.handle_initialize()),
            "ping" => success_response(id, json!({})),
            "resources/list" => {
                into_response(id, self.bounded(resources::handle_list(&self.client)).await)
            }
            "resources/read" => into_response(
                id,
                self.bounded(resources::handle_read(&self.client, params))
                    .await,
            ),
            "tools/list" => success_response(id, tools::handle_list()),
            "tools/call" => {
                let result = self
                    .bounded(async { Ok(tools::handle_call(&self.client, params).await) })
                    .await
                    .unwrap_or_else(|e| tools::tool_error(&e.to_string()));
                success_response(id, result)
            }
            _ => method_not_found(id, method),
        };

        Some(response)
    }

    /// Serve requests from `reader` until it reaches end of input.
    pub async fn serve<Rd, W>(&self, reader: Rd, mut writer: W) -> std::io::Result<()>
    where
        Rd: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(name = %self.info.name, version = %self.info.version, "MCP server ready");

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(response) = self.handle_line(&line).await {
                if let Some(error) = &response.error {
                    tracing::debug!(code = error.code, message = %error.message, "MCP -> error");
                }
                write_response(&mut writer, &response).await?;
            }
        }

        tracing::info!("stdin closed, MCP server stopping");
        Ok(())
    }
}

fn into_response(id: Value, result: Result<Value, McpError>) -> Response {
    match result {
        Ok(value) => success_response(id, value),
        Err(e) => {
            tracing::warn!(error = %e, "MCP request failed");
            error_response(id, e.code(), e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp_error_codes() {
        assert_eq!(McpError::InvalidParams("x".into()).code(), INVALID_PARAMS);
        assert_eq!(
            McpError::Session(SessionError::NotConnected).code(),
            INTERNAL_ERROR
        );
        assert_eq!(
            McpError::Timeout(Duration::from_millis(250)).to_string(),
            "request timed out after 250 ms"
        );
        assert_eq!(
            McpError::from(SessionError::ConnectionClosed).to_string(),
            "connection to tmux closed"
        );
    }

    #[test]
    fn test_default_server_info() {
        let info = ServerInfo::default();
        assert_eq!(info.name, "mcp-tmux-server");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }
}
