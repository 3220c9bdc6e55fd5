//! Incremental parser for tmux control-mode response frames.
//!
//! # Frame Format
//!
//! Every command written to a control-mode client is answered by one frame:
//!
//! ```text
//! %begin <token> <timestamp> <flags>
//! <zero or more output lines>
//! %end <token> <timestamp> <flags>
//! ```
//!
//! A failed command carries an `%error <message>` line before `%end`. tmux
//! itself reports failure by putting the message on the output lines and
//! closing the frame with `%error` followed by the same arguments as the
//! opening `%begin`; both shapes are accepted.
//!
//! # Chunking
//!
//! Bytes may arrive in chunks of any size. The parser keeps the unterminated
//! tail of the stream in a buffer and only classifies a line once its `\n`
//! has arrived, so chunk boundaries never change the result. Lines are
//! decoded as UTF-8 after they are complete, which keeps multi-byte
//! characters split across chunks intact.

use bytes::BytesMut;

use crate::error::{ProtocolError, Result};
use crate::messages::{ResponseFrame, BEGIN_MARKER, END_MARKER, ERROR_MARKER};

/// Initial capacity of the stream buffer.
const INITIAL_BUFFER_CAPACITY: usize = 4096;

/// A frame that has seen its `%begin` but not yet its terminator.
#[derive(Debug)]
struct OpenFrame {
    token: Option<u64>,
    /// Raw arguments of the `%begin` line, used to recognise tmux's own
    /// `%error` trailer.
    args: String,
    lines: Vec<String>,
    error: Option<String>,
}

impl OpenFrame {
    fn new(args: &str) -> Self {
        Self {
            token: args
                .split_whitespace()
                .next()
                .and_then(|field| field.parse().ok()),
            args: args.to_string(),
            lines: Vec::new(),
            error: None,
        }
    }

    fn finish(self) -> ResponseFrame {
        ResponseFrame {
            token: self.token,
            output_lines: self.lines,
            error: self.error,
        }
    }

    /// Close the frame on a native tmux `%error` trailer: the output lines
    /// are the error message.
    fn finish_with_trailer(self) -> ResponseFrame {
        ResponseFrame {
            token: self.token,
            output_lines: Vec::new(),
            error: Some(self.lines.join("\n")),
        }
    }

    fn abandon(self) -> ProtocolError {
        ProtocolError::UnterminatedFrame {
            token: self.token,
            discarded_lines: self.lines.len(),
        }
    }
}

/// Returns the arguments following `marker` if `line` is that marker.
///
/// The marker must be the whole line or be followed by a space, so output
/// such as `%beginning` is not mistaken for a marker.
fn marker_args<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(marker)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}

/// Incremental control-mode frame parser.
///
/// Feed raw chunks with [`push`](Self::push) and drain completed frames with
/// [`next_frame`](Self::next_frame) or the [`frames`](Self::frames) iterator.
/// Malformed markers are yielded as `Err` items; parsing always continues.
#[derive(Debug)]
pub struct FrameParser {
    /// Bytes not yet forming a complete line.
    buffer: BytesMut,
    /// Prefix of `buffer` already known to contain no newline.
    scanned: usize,
    /// The frame currently being accumulated.
    open: Option<OpenFrame>,
    /// Lines seen outside any frame.
    noise_lines: u64,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    /// Create an idle parser with an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scanned: 0,
            open: None,
            noise_lines: 0,
        }
    }

    /// Append a chunk of raw stream bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Append a chunk of text.
    pub fn push_str(&mut self, chunk: &str) {
        self.push(chunk.as_bytes());
    }

    /// Append a chunk and iterate over everything it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Frames<'_> {
        self.push(chunk);
        self.frames()
    }

    /// Iterate over the frames completed by the buffered bytes.
    ///
    /// Lines are consumed lazily. Whatever the iterator does not reach stays
    /// buffered for the next call.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { parser: self }
    }

    /// Consume buffered lines until a frame completes or a protocol error is
    /// found.
    ///
    /// Returns `None` once only an unterminated remainder is left.
    pub fn next_frame(&mut self) -> Option<Result<ResponseFrame>> {
        loop {
            let line = self.take_line()?;
            if let Some(item) = self.process_line(line) {
                return Some(item);
            }
        }
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a `%begin` has been seen without its terminator.
    pub fn in_frame(&self) -> bool {
        self.open.is_some()
    }

    /// Lines discarded because they arrived outside a frame.
    pub fn noise_lines(&self) -> u64 {
        self.noise_lines
    }

    /// Drop all buffered bytes and any partially accumulated frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.open = None;
    }

    /// Split the next complete line off the front of the buffer.
    fn take_line(&mut self) -> Option<String> {
        let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buffer.len();
            return None;
        };

        let newline = self.scanned + offset;
        let mut line = self.buffer.split_to(newline + 1);
        self.scanned = 0;

        line.truncate(newline);
        if line.ends_with(b"\r") {
            line.truncate(newline - 1);
        }

        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: String) -> Option<Result<ResponseFrame>> {
        if let Some(args) = marker_args(&line, BEGIN_MARKER) {
            let stale = self.open.replace(OpenFrame::new(args));
            return stale.map(|frame| Err(frame.abandon()));
        }

        let Some(open) = self.open.as_mut() else {
            return self.discard(line);
        };

        if marker_args(&line, END_MARKER).is_some() {
            return self.open.take().map(|frame| Ok(frame.finish()));
        }

        if let Some(args) = marker_args(&line, ERROR_MARKER) {
            if args == open.args {
                return self.open.take().map(|frame| Ok(frame.finish_with_trailer()));
            }
            open.error = Some(args.to_string());
            return None;
        }

        open.lines.push(line);
        None
    }

    fn discard(&mut self, line: String) -> Option<Result<ResponseFrame>> {
        if marker_args(&line, END_MARKER).is_some() {
            return Some(Err(ProtocolError::UnexpectedEnd { line }));
        }
        if marker_args(&line, ERROR_MARKER).is_some() {
            return Some(Err(ProtocolError::UnexpectedError { line }));
        }
        self.noise_lines += 1;
        None
    }
}

/// Iterator over frames completed by a [`FrameParser`]'s buffered bytes.
#[derive(Debug)]
pub struct Frames<'a> {
    parser: &'a mut FrameParser,
}

impl Iterator for Frames<'_> {
    type Item = Result<ResponseFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.parser.next_frame()
    }
}
