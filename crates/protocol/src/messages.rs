//! Response types produced by the control-mode protocol.

use serde::{Deserialize, Serialize};

/// Marker that opens a response frame.
pub const BEGIN_MARKER: &str = "%begin";

/// Marker that closes a response frame.
pub const END_MARKER: &str = "%end";

/// Marker that flags a response frame as failed.
pub const ERROR_MARKER: &str = "%error";

/// One complete `%begin` .. `%end` unit read from a control-mode stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseFrame {
    /// The numeric token carried by the `%begin` marker.
    ///
    /// Kept for diagnostics only. Frames are correlated with commands by
    /// arrival order, never by this value.
    pub token: Option<u64>,
    /// Output lines between the markers, in order, without terminators.
    pub output_lines: Vec<String>,
    /// Error message reported for this frame, if any.
    pub error: Option<String>,
}

impl ResponseFrame {
    /// Returns true if the frame carries no error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The frame's output lines joined with `\n`.
    pub fn output(&self) -> String {
        self.output_lines.join("\n")
    }

    /// Convert the frame into the response handed to callers.
    pub fn into_response(self) -> CommandResponse {
        let output = self.output();
        CommandResponse {
            success: self.error.is_none(),
            output,
            error: self.error,
        }
    }
}

impl From<ResponseFrame> for CommandResponse {
    fn from(frame: ResponseFrame) -> Self {
        frame.into_response()
    }
}

/// The structured result of one tmux command.
///
/// A command that tmux rejected still produces a `CommandResponse`, with
/// `success == false` and the message in `error`. Only channel failures are
/// reported as Rust errors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether tmux accepted and ran the command.
    pub success: bool,
    /// Command output.
    pub output: String,
    /// Error message reported by tmux.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Build a successful response.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    /// Build a failed response carrying an error message.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// The error message, or an empty string when there is none.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
