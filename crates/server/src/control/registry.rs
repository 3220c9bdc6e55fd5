//! Registry of commands waiting for their response frame.
//!
//! tmux answers commands strictly in the order it read them, so responses
//! are matched to commands by position in a FIFO queue. The numeric token in
//! a frame's `%begin` line is never used for matching; tmux's numbering does
//! not have to line up with anything the client counts.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use protocol::CommandResponse;
use tokio::sync::oneshot;

use super::error::SessionError;

/// What a pending command eventually resolves to.
pub type Completion = Result<CommandResponse, SessionError>;

/// A command written to tmux whose frame has not arrived yet.
#[derive(Debug)]
struct PendingCommand {
    order: u64,
    completion: oneshot::Sender<Completion>,
}

/// FIFO queue of pending commands.
///
/// The registry starts closed. [`reopen`](Self::reopen) arms it when a
/// connection is established and [`reject_all`](Self::reject_all) closes it
/// again, so no entry can be added once the connection is gone.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    queue: VecDeque<PendingCommand>,
    next_order: u64,
    accepting: bool,
}

impl PendingRegistry {
    /// Create an empty, closed registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new entry and return the handle its caller awaits.
    pub fn enqueue(&mut self) -> Result<ResponseHandle, SessionError> {
        if !self.accepting {
            return Err(SessionError::NotConnected);
        }

        let order = self.next_order;
        self.next_order += 1;

        let (tx, rx) = oneshot::channel();
        self.queue.push_back(PendingCommand {
            order,
            completion: tx,
        });

        Ok(ResponseHandle { order, rx })
    }

    /// Complete the oldest entry with `response`.
    ///
    /// Returns `false` if nothing was pending, which means the stream and the
    /// queue are out of step. That is logged, never raised.
    pub fn resolve_next(&mut self, response: CommandResponse) -> bool {
        let Some(pending) = self.queue.pop_front() else {
            tracing::warn!(
                success = response.success,
                "Response frame arrived with no pending command; dropping it"
            );
            return false;
        };

        if pending.completion.send(Ok(response)).is_err() {
            tracing::debug!(
                order = pending.order,
                "Caller stopped waiting; response discarded"
            );
        }
        true
    }

    /// Fail every remaining entry with `reason` and stop accepting new ones.
    ///
    /// Returns the number of entries rejected.
    pub fn reject_all(&mut self, reason: SessionError) -> usize {
        self.accepting = false;

        let rejected = self.queue.len();
        for pending in self.queue.drain(..) {
            // Callers that already gave up have dropped their receiver.
            let _ = pending.completion.send(Err(reason.clone()));
        }

        if rejected > 0 {
            tracing::debug!(rejected, reason = %reason, "Rejected pending commands");
        }
        rejected
    }

    /// Start accepting entries again after a new connection is up.
    pub fn reopen(&mut self) {
        self.accepting = true;
    }

    /// Remove the newest entry if it is the one identified by `order`.
    ///
    /// Used only when a command could not be handed to the writer after its
    /// entry was added.
    pub fn discard_last(&mut self, order: u64) -> bool {
        match self.queue.back() {
            Some(last) if last.order == order => {
                self.queue.pop_back();
                true
            }
            _ => false,
        }
    }

    /// Whether new entries are accepted.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Number of outstanding entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no entries are outstanding.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Completion handle for one submitted command.
///
/// Awaiting it yields the command's response, or the reason the connection
/// closed first. Dropping it abandons interest in the result but leaves the
/// registry entry in place, so later responses still line up.
#[derive(Debug)]
pub struct ResponseHandle {
    order: u64,
    rx: oneshot::Receiver<Completion>,
}

impl ResponseHandle {
    /// Submission order of the command this handle belongs to.
    pub fn order(&self) -> u64 {
        self.order
    }
}

impl Future for ResponseHandle {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SessionError::ConnectionClosed)))
    }
}
