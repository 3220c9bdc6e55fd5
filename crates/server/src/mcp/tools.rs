//! Tool descriptors and `tools/call` dispatch.

use serde_json::{json, Value};

use crate::control::SessionError;
use crate::tmux::{CommandRunner, CreateSessionOptions, TmuxClient};

// ---------------------------------------------------------------------------
// Tool descriptors
// ---------------------------------------------------------------------------

fn create_session_tool() -> Value {
    json!({
        "name": "create_session",
        "description": "Create a new tmux session",
        "inputSchema": {
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the session" },
                "command": { "type": "string", "description": "Initial command to run (optional)" },
                "width": { "type": "number", "description": "Terminal width (optional)" },
                "height": { "type": "number", "description": "Terminal height (optional)" }
            },
            "required": ["name"]
        }
    })
}

fn kill_session_tool() -> Value {
    json!({
        "name": "kill_session",
        "description": "Kill a tmux session",
        "inputSchema": {
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Name of the session to kill" }
            },
            "required": ["name"]
        }
    })
}

fn send_command_tool() -> Value {
    json!({
        "name": "send_command",
        "description": "Send a command to a tmux session",
        "inputSchema": {
            "type": "object",
            "properties": {
                "session": { "type": "string", "description": "Session name" },
                "window": { "type": "string", "description": "Window ID" },
                "pane": { "type": "string", "description": "Pane ID" },
                "command": { "type": "string", "description": "Command to send" }
            },
            "required": ["session", "window", "pane", "command"]
        }
    })
}

/// Handle `tools/list`.
pub fn handle_list() -> Value {
    json!({
        "tools": [create_session_tool(), kill_session_tool(), send_command_tool()]
    })
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Build a successful tool result.
pub fn tool_text(message: &str) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }]
    })
}

/// Build a tool error result.
pub fn tool_error(message: &str) -> Value {
    json!({
        "isError": true,
        "content": [{ "type": "text", "text": message }]
    })
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, Value> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| tool_error(&format!("Missing required argument: {key}")))
}

fn optional_u32(args: &Value, key: &str) -> Result<Option<u32>, Value> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && *n >= 1.0 && *n <= f64::from(u32::MAX))
            .map(|n| Some(n as u32))
            .ok_or_else(|| tool_error(&format!("Argument {key} must be a positive integer"))),
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Handle `tools/call`.
///
/// Every outcome is a tool result. Failures, including commands tmux
/// rejects, carry `isError: true`.
pub async fn handle_call<R: CommandRunner>(client: &TmuxClient<R>, params: Option<&Value>) -> Value {
    let Some(params) = params else {
        return tool_error("Missing params for tools/call");
    };

    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let empty = json!({});
    let args = params.get("arguments").unwrap_or(&empty);

    let outcome = match name {
        "create_session" => create_session(client, args).await,
        "kill_session" => kill_session(client, args).await,
        "send_command" => send_command(client, args).await,
        _ => Err(tool_error(&format!("Unknown tool: {name}"))),
    };

    outcome.unwrap_or_else(|error| error)
}

fn channel_error(error: &SessionError) -> Value {
    tracing::warn!(error = %error, "tmux unavailable for tool call");
    tool_error(&format!("tmux unavailable: {error}"))
}

async fn create_session<R: CommandRunner>(
    client: &TmuxClient<R>,
    args: &Value,
) -> Result<Value, Value> {
    let options = CreateSessionOptions {
        name: required_str(args, "name")?.to_string(),
        command: args
            .get("command")
            .and_then(Value::as_str)
            .map(str::to_string),
        width: optional_u32(args, "width")?,
        height: optional_u32(args, "height")?,
    };

    let response = client
        .create_session(&options)
        .await
        .map_err(|e| channel_error(&e))?;

    Ok(if response.success {
        tool_text(&format!("Created tmux session: {}", options.name))
    } else {
        tool_error(&format!(
            "Failed to create session: {}",
            response.error_text()
        ))
    })
}

async fn kill_session<R: CommandRunner>(
    client: &TmuxClient<R>,
    args: &Value,
) -> Result<Value, Value> {
    let name = required_str(args, "name")?;

    let response = client
        .kill_session(name)
        .await
        .map_err(|e| channel_error(&e))?;

    Ok(if response.success {
        tool_text(&format!("Killed tmux session: {name}"))
    } else {
        tool_error(&format!("Failed to kill session: {}", response.error_text()))
    })
}

async fn send_command<R: CommandRunner>(
    client: &TmuxClient<R>,
    args: &Value,
) -> Result<Value, Value> {
    let session = required_str(args, "session")?;
    let window = required_str(args, "window")?;
    let pane = required_str(args, "pane")?;
    let command = required_str(args, "command")?;

    let response = match client.send_keys(session, window, pane, command).await {
        Ok(response) => response,
        Err(SessionError::InvalidCommand(reason)) => {
            return Err(tool_error(&format!("Failed to send command: {reason}")));
        }
        Err(e) => return Err(channel_error(&e)),
    };

    Ok(if response.success {
        tool_text(&format!("Sent command to {session}:{window}.{pane}"))
    } else {
        tool_error(&format!("Failed to send command: {}", response.error_text()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_list_names() {
        let list = handle_list();
        let names: Vec<&str> = list["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["create_session", "kill_session", "send_command"]);
    }

    #[test]
    fn test_send_command_schema_requires_everything() {
        let tool = send_command_tool();
        assert_eq!(
            tool["inputSchema"]["required"],
            json!(["session", "window", "pane", "command"])
        );
    }

    #[test]
    fn test_tool_error_shape() {
        let err = tool_error("boom");
        assert_eq!(err["isError"], json!(true));
        assert_eq!(err["content"][0]["text"], json!("boom"));
        assert!(tool_text("fine").get("isError").is_none());
    }

    #[test]
    fn test_optional_u32() {
        let args = json!({"width": 120, "height": null, "bad": -3, "frac": 1.5});
        assert_eq!(optional_u32(&args, "width").unwrap(), Some(120));
        assert_eq!(optional_u32(&args, "height").unwrap(), None);
        assert_eq!(optional_u32(&args, "missing").unwrap(), None);
        assert!(optional_u32(&args, "bad").is_err());
        assert!(optional_u32(&args, "frac").is_err());
    }

    #[test]
    fn test_required_str() {
        let args = json!({"name": "work", "n": 3});
        assert_eq!(required_str(&args, "name").unwrap(), "work");

        let err = required_str(&args, "n").unwrap_err();
        assert_eq!(err["content"][0]["text"], json!("Missing required argument: n"));
    }
}
