//! # tmux Control-Mode Protocol Library
//!
//! This crate turns the byte stream produced by `tmux -C` into complete
//! response frames. It knows nothing about processes or I/O and can be
//! driven from any reader.
//!
//! ## Overview
//!
//! - **Frame Parser**: incremental, chunk-boundary independent parsing of
//!   `%begin` / `%end` / `%error` delimited frames
//! - **Response Types**: the parsed frame and the `CommandResponse` handed
//!   back to callers
//! - **Protocol Errors**: malformed markers, reported without stopping the
//!   parser
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::FrameParser;
//!
//! let mut parser = FrameParser::new();
//! assert!(parser.feed(b"%begin 0\n").next().is_none());
//!
//! let frame = parser
//!     .feed(b"0: mcp: 1 windows\n%end 0\n")
//!     .next()
//!     .unwrap()
//!     .unwrap();
//!
//! let response = frame.into_response();
//! assert!(response.success);
//! assert_eq!(response.output, "0: mcp: 1 windows");
//! ```
//!
//! ## Modules
//!
//! - [`framing`]: the frame parser
//! - [`messages`]: frame and response types, marker constants
//! - [`error`]: error types

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{FrameParser, Frames};
pub use messages::{CommandResponse, ResponseFrame, BEGIN_MARKER, END_MARKER, ERROR_MARKER};
