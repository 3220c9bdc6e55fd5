//! `resources/list` and `resources/read`: tmux sessions as `tmux://<name>`.

use serde_json::{json, Value};

use super::McpError;
use crate::tmux::{CommandRunner, TmuxClient, TmuxSession};

/// URI scheme for session resources.
pub const URI_SCHEME: &str = "tmux://";

/// Text returned for a session with no panes to capture.
pub const EMPTY_SESSION_TEXT: &str = "Empty session";

pub fn session_uri(name: &str) -> String {
    format!("{URI_SCHEME}{name}")
}

/// Session name addressed by `uri`.
pub fn parse_session_uri(uri: &str) -> Result<&str, McpError> {
    let name = uri
        .strip_prefix(URI_SCHEME)
        .ok_or_else(|| McpError::InvalidParams(format!("Unsupported resource URI: {uri}")))?
        .trim_end_matches('/');
    if name.is_empty() {
        return Err(McpError::InvalidParams(format!(
            "Resource URI has no session name: {uri}"
        )));
    }
    Ok(name)
}

fn describe(session: &TmuxSession) -> Value {
    json!({
        "uri": session_uri(&session.name),
        "mimeType": "text/plain",
        "name": session.name,
        "description": format!(
            "Tmux session: {} (Created: {})",
            session.name,
            session.created.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    })
}

/// Handle `resources/list`.
pub async fn handle_list<R: CommandRunner>(client: &TmuxClient<R>) -> Result<Value, McpError> {
    let sessions = client.list_sessions().await?;
    let resources: Vec<Value> = sessions.iter().map(describe).collect();
    Ok(json!({ "resources": resources }))
}

/// Handle `resources/read`: the captured contents of every pane in the session.
pub async fn handle_read<R: CommandRunner>(
    client: &TmuxClient<R>,
    params: Option<&Value>,
) -> Result<Value, McpError> {
    let uri = params
        .and_then(|p| p.get("uri"))
        .and_then(Value::as_str)
        .ok_or_else(|| McpError::InvalidParams("Missing required parameter: uri".to_string()))?;
    let session = parse_session_uri(uri)?;

    let mut text = String::new();
    for window in client.get_windows(session).await? {
        for pane in &window.panes {
            let content = client.capture_pane(session, &window.id, &pane.id).await?;
            text.push_str(&format!(
                "=== Window: {} | Pane: {} ===\n{}\n\n",
                window.name, pane.id, content
            ));
        }
    }
    if text.is_empty() {
        text.push_str(EMPTY_SESSION_TEXT);
    }

    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": "text/plain",
            "text": text,
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_uri_round_trip() {
        assert_eq!(session_uri("mcp"), "tmux://mcp");
        assert_eq!(parse_session_uri("tmux://mcp").unwrap(), "mcp");
        assert_eq!(parse_session_uri("tmux://mcp/").unwrap(), "mcp");
    }

    #[test]
    fn test_parse_session_uri_rejects_other_schemes() {
        assert!(matches!(
            parse_session_uri("file:///etc/passwd"),
            Err(McpError::InvalidParams(_))
        ));
        assert!(matches!(
            parse_session_uri("tmux://"),
            Err(McpError::InvalidParams(_))
        ));
    }
}
