//! tmux object model and listing-line parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a listing line could not be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("field {field} is not a valid number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// A tmux session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxSession {
    /// Session ID, e.g. `$0`.
    pub id: String,
    pub name: String,
    pub created: DateTime<Utc>,
    /// Whether any client is attached.
    pub attached: bool,
    pub windows: Vec<TmuxWindow>,
}

/// A tmux window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxWindow {
    /// Window ID, e.g. `@1`.
    pub id: String,
    pub name: String,
    pub active: bool,
    pub index: u32,
    pub layout: String,
    /// Window flags such as `*` (current) and `-` (last).
    pub flags: Vec<char>,
    pub panes: Vec<TmuxPane>,
}

/// A tmux pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxPane {
    /// Pane ID, e.g. `%3`.
    pub id: String,
    pub active: bool,
    pub width: u32,
    pub height: u32,
    /// Foreground command running in the pane.
    pub command: String,
    pub pid: u32,
}

/// Parameters for creating a session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateSessionOptions {
    pub name: String,
    /// Shell command to run in the first window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl CreateSessionOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

fn split_fields<const N: usize>(line: &str) -> Result<[&str; N], ListingError> {
    let fields: Vec<&str> = line.split('|').collect();
    fields.try_into().map_err(|fields: Vec<&str>| ListingError::FieldCount {
        expected: N,
        found: fields.len(),
    })
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, ListingError> {
    value.parse().map_err(|_| ListingError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

impl FromStr for TmuxSession {
    type Err = ListingError;

    /// Parse one line of [`SESSION_FORMAT`](super::commands::SESSION_FORMAT) output.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let [id, name, created, attached] = split_fields(line)?;
        let seconds: i64 = number("session_created", created)?;
        let created = DateTime::from_timestamp(seconds, 0).ok_or(ListingError::InvalidNumber {
            field: "session_created",
            value: created.to_string(),
        })?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            created,
            attached: attached == "1",
            windows: Vec::new(),
        })
    }
}

impl FromStr for TmuxWindow {
    type Err = ListingError;

    /// Parse one line of [`WINDOW_FORMAT`](super::commands::WINDOW_FORMAT) output.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let [id, name, active, index, layout, flags] = split_fields(line)?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            active: active == "1",
            index: number("window_index", index)?,
            layout: layout.to_string(),
            flags: flags.chars().collect(),
            panes: Vec::new(),
        })
    }
}

impl FromStr for TmuxPane {
    type Err = ListingError;

    /// Parse one line of [`PANE_FORMAT`](super::commands::PANE_FORMAT) output.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let [id, active, width, height, command, pid] = split_fields(line)?;

        Ok(Self {
            id: id.to_string(),
            active: active == "1",
            width: number("pane_width", width)?,
            height: number("pane_height", height)?,
            command: command.to_string(),
            pid: number("pane_pid", pid)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session() {
        let session: TmuxSession = "$0|mcp|1700000000|1".parse().unwrap();
        assert_eq!(session.id, "$0");
        assert_eq!(session.name, "mcp");
        assert_eq!(session.created.timestamp(), 1_700_000_000);
        assert!(session.attached);
        assert!(session.windows.is_empty());
    }

    #[test]
    fn test_parse_session_detached() {
        let session: TmuxSession = "$4|work|0|0".parse().unwrap();
        assert!(!session.attached);
    }

    #[test]
    fn test_parse_session_bad_timestamp() {
        let err = "$0|mcp|yesterday|1".parse::<TmuxSession>().unwrap_err();
        assert_eq!(
            err,
            ListingError::InvalidNumber {
                field: "session_created",
                value: "yesterday".to_string()
            }
        );
    }

    #[test]
    fn test_parse_window() {
        let window: TmuxWindow = "@1|editor|1|0|b25d,80x24,0,0,1|*Z".parse().unwrap();
        assert_eq!(window.id, "@1");
        assert_eq!(window.name, "editor");
        assert!(window.active);
        assert_eq!(window.index, 0);
        assert_eq!(window.layout, "b25d,80x24,0,0,1");
        assert_eq!(window.flags, vec!['*', 'Z']);
    }

    #[test]
    fn test_parse_window_no_flags() {
        let window: TmuxWindow = "@2|logs|0|1|layout|".parse().unwrap();
        assert!(!window.active);
        assert!(window.flags.is_empty());
    }

    #[test]
    fn test_parse_pane() {
        let pane: TmuxPane = "%3|1|80|24|zsh|12345".parse().unwrap();
        assert_eq!(pane.id, "%3");
        assert!(pane.active);
        assert_eq!((pane.width, pane.height), (80, 24));
        assert_eq!(pane.command, "zsh");
        assert_eq!(pane.pid, 12345);
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = "%3|1|80".parse::<TmuxPane>().unwrap_err();
        assert_eq!(err, ListingError::FieldCount { expected: 6, found: 3 });
        assert_eq!(err.to_string(), "expected 6 fields, found 3");
    }

    #[test]
    fn test_window_name_with_separator_is_rejected() {
        // A '|' inside a name shifts every field.
        assert!("@1|a|b|1|0|layout|*".parse::<TmuxWindow>().is_err());
    }

    #[test]
    fn test_create_options_deserialize() {
        let options: CreateSessionOptions =
            serde_json::from_str(r#"{"name":"work","width":120}"#).unwrap();
        assert_eq!(options.name, "work");
        assert_eq!(options.width, Some(120));
        assert_eq!(options.height, None);
        assert_eq!(options.command, None);
    }
}
