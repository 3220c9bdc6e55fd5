//! Error types for the protocol crate.

use thiserror::Error;

/// A malformed or unmatched marker in a control-mode stream.
///
/// These never abort parsing. The parser yields them in place of a frame so
/// the consumer can log them and carry on with the rest of the stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// An `%end` marker arrived while no frame was open.
    #[error("unexpected %end marker outside of a frame: {line:?}")]
    UnexpectedEnd {
        /// The offending line.
        line: String,
    },

    /// An `%error` marker arrived while no frame was open.
    #[error("unexpected %error marker outside of a frame: {line:?}")]
    UnexpectedError {
        /// The offending line.
        line: String,
    },

    /// A `%begin` marker arrived before the previous frame was closed.
    ///
    /// The previous frame is discarded and the new one takes its place.
    #[error("frame {token:?} was never terminated; discarded {discarded_lines} line(s)")]
    UnterminatedFrame {
        /// Correlation token of the abandoned frame, if it carried one.
        token: Option<u64>,
        /// Number of output lines thrown away with it.
        discarded_lines: usize,
    },
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_end_display() {
        let err = ProtocolError::UnexpectedEnd {
            line: "%end 4 1700000000 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected %end marker outside of a frame: \"%end 4 1700000000 0\""
        );
    }

    #[test]
    fn test_unexpected_error_display() {
        let err = ProtocolError::UnexpectedError {
            line: "%error boom".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected %error marker outside of a frame: \"%error boom\""
        );
    }

    #[test]
    fn test_unterminated_frame_display() {
        let err = ProtocolError::UnterminatedFrame {
            token: Some(7),
            discarded_lines: 2,
        };
        assert_eq!(
            err.to_string(),
            "frame Some(7) was never terminated; discarded 2 line(s)"
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }
}
