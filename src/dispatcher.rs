//! Reply correlation for one connection.
//!
//! beanstalkd answers pipelined commands strictly in the order they were
//! issued, so a reply always belongs to the oldest pending command. The
//! `Dispatcher` keeps that queue, frames inbound bytes into replies and
//! resolves each waiter in turn. It does no I/O of its own.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use tokio::sync::oneshot;

use crate::command::Command;
use crate::config::{MAX_REPLY_BODY_SIZE, MAX_STATUS_LINE_LEN};
use crate::error::{BeanstalkError, BeanstalkResult};
use crate::response::{decode, Decoded, Reply, ResponseSpec};

pub type ReplySlot = oneshot::Sender<BeanstalkResult<Decoded>>;

/// Future resolving to the decoded reply of one command.
#[derive(Debug)]
pub struct ReplyFuture {
    rx: oneshot::Receiver<BeanstalkResult<Decoded>>,
}

impl ReplyFuture {
    pub fn new(rx: oneshot::Receiver<BeanstalkResult<Decoded>>) -> ReplyFuture {
        ReplyFuture { rx }
    }

    /// Create a slot and the future waiting on it.
    pub fn channel() -> (ReplySlot, ReplyFuture) {
        let (tx, rx) = oneshot::channel();
        (tx, ReplyFuture::new(rx))
    }

    /// Take the outcome if the reply has already been resolved.
    pub fn try_take(&mut self) -> Option<BeanstalkResult<Decoded>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(BeanstalkError::ConnectionClosed))
            }
        }
    }
}

impl Future for ReplyFuture {
    type Output = BeanstalkResult<Decoded>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|outcome| outcome.unwrap_or(Err(BeanstalkError::ConnectionClosed)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug)]
struct Pending {
    verb: &'static str,
    spec: ResponseSpec,
    slot: ReplySlot,
}

#[derive(Debug)]
pub struct Dispatcher {
    state: State,
    pending: VecDeque<Pending>,
    buffer: BytesMut,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher::new()
    }
}

impl Dispatcher {
    pub fn new() -> Dispatcher {
        Dispatcher {
            state: State::Connecting,
            pending: VecDeque::new(),
            buffer: BytesMut::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn on_connected(&mut self) {
        if self.state == State::Connecting {
            self.state = State::Open;
        }
    }

    /// Queue `command` behind every command already in flight.
    ///
    /// Returns `false`, rejecting the slot, when the connection is not open;
    /// the caller must then not write the command.
    pub fn enqueue(&mut self, command: &Command, slot: ReplySlot) -> bool {
        if self.state != State::Open {
            let _ = slot.send(Err(BeanstalkError::ConnectionClosed));
            return false;
        }

        self.pending.push_back(Pending {
            verb: command.verb(),
            spec: *command.spec(),
            slot,
        });
        true
    }

    /// Feed inbound bytes. Every reply completed by `chunk` resolves the
    /// oldest pending command; a partial reply stays buffered.
    pub fn on_data(&mut self, chunk: &[u8]) {
        if self.state != State::Open {
            tracing::warn!(
                len = chunk.len(),
                "dropping data received while the connection is not open"
            );
            return;
        }

        self.buffer.extend_from_slice(chunk);
        while self.state == State::Open {
            if !self.dispatch_one() {
                break;
            }
        }
    }

    /// Resolve the oldest pending command if its whole reply is buffered.
    fn dispatch_one(&mut self) -> bool {
        let line_end = match self.buffer.windows(2).position(|w| w == b"\r\n") {
            Some(i) => i + 2,
            None if self.buffer.len() > MAX_STATUS_LINE_LEN => {
                self.desync(BeanstalkError::UnexpectedResponse(format!(
                    "no status line within {} bytes",
                    MAX_STATUS_LINE_LEN
                )));
                return false;
            }
            None => return false,
        };

        let spec = match self.pending.front() {
            Some(pending) => pending.spec,
            None => {
                tracing::warn!("unsolicited reply, closing connection");
                self.on_connection_lost();
                return false;
            }
        };

        let mut reply = match Reply::parse_line(&self.buffer[..line_end]) {
            Ok(reply) => reply,
            Err(err) => {
                self.desync(err);
                return false;
            }
        };

        let body_len = match spec.body_len(&reply) {
            Ok(len) => len,
            Err(err) => {
                self.desync(err);
                return false;
            }
        };

        let frame_len = match body_len {
            Some(n) if n > MAX_REPLY_BODY_SIZE => None,
            Some(n) => n.checked_add(2).and_then(|n| n.checked_add(line_end)),
            None => Some(line_end),
        };
        let frame_len = match frame_len {
            Some(len) => len,
            None => {
                self.desync(BeanstalkError::UnexpectedResponse(format!(
                    "{} announces a body of {} bytes",
                    reply.status,
                    body_len.unwrap_or_default()
                )));
                return false;
            }
        };
        if self.buffer.len() < frame_len {
            return false;
        }

        let frame = self.buffer.split_to(frame_len);
        if body_len.is_some() {
            reply.body = Some(frame[line_end..].to_vec());
        }

        let pending = match self.pending.pop_front() {
            Some(pending) => pending,
            None => return false,
        };
        tracing::trace!(verb = pending.verb, reply = %reply, "reply received");

        let outcome = decode(&pending.spec, reply);
        let fatal = matches!(outcome, Err(BeanstalkError::UnexpectedResponse(_)));
        if let Err(BeanstalkError::UnexpectedResponse(ref message)) = outcome {
            tracing::warn!(verb = pending.verb, %message, "connection out of sync");
        }

        // A dropped receiver means the caller gave up; the reply is still consumed.
        let _ = pending.slot.send(outcome);

        if fatal {
            self.on_connection_lost();
            return false;
        }
        true
    }

    /// The oldest command gets `err`; everything behind it is lost.
    fn desync(&mut self, err: BeanstalkError) {
        tracing::warn!(error = %err, "connection out of sync");
        if let Some(pending) = self.pending.pop_front() {
            let _ = pending.slot.send(Err(err));
        }
        self.on_connection_lost();
    }

    /// Close the dispatcher and reject every pending command.
    pub fn on_connection_lost(&mut self) {
        if self.state != State::Closed {
            tracing::debug!(pending = self.pending.len(), "connection closed");
        }
        self.state = State::Closed;
        self.buffer.clear();
        for pending in self.pending.drain(..) {
            let _ = pending.slot.send(Err(BeanstalkError::ConnectionClosed));
        }
    }
}
