//! Session queues between the socket and the rest of the client.
//!
//! [`SessionQueue`] turns received bytes into [`Message`]s and queued
//! outbound [`Message`]s into one contiguous write. It holds the leftover of
//! a partial line between reads, so callers can feed it whatever the socket
//! produced without caring where lines break.
//!
//! All methods take `&self`. The message-received handler usually pops the
//! very queue that fired it, which rules out `&mut self` on a shared
//! `Rc<SessionQueue>`.

use std::{cell::RefCell, collections::VecDeque, fmt, mem};

use bytes::{Buf, Bytes, BytesMut};
use ircc_proto::{MAX_LINE_LEN, Message, ProtocolError, TERMINATOR};
use tracing::{debug, warn};

use crate::Signal;

/// Outcome of one [`SessionQueue::ingest`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Ingested {
    /// Messages parsed and queued
    pub accepted: usize,
    /// Lines that were malformed or too long, in arrival order. They have
    /// been consumed.
    pub rejected: Vec<ProtocolError>,
}

#[derive(Default)]
struct Queues {
    leftover: BytesMut,
    /// Inside an overlong line already reported; drop bytes up to its CRLF
    skipping: bool,
    inbound: VecDeque<Message>,
    outbound: VecDeque<Message>,
}

impl Queues {
    /// Split every complete line off the leftover buffer.
    fn frame(&mut self, ingested: &mut Ingested) {
        loop {
            let end = find_terminator(&self.leftover);

            if self.skipping {
                let Some(end) = end else {
                    self.keep_partial_terminator();
                    return;
                };
                self.leftover.advance(end + TERMINATOR.len());
                self.skipping = false;
                debug!("resynchronized after overlong line");
                continue;
            }

            match end {
                Some(end) if end + TERMINATOR.len() > MAX_LINE_LEN => {
                    self.leftover.advance(end + TERMINATOR.len());
                    reject(ingested, ProtocolError::MessageTooLong {
                        size: end + TERMINATOR.len(),
                        max: MAX_LINE_LEN,
                    });
                },
                Some(_) => match Message::parse(&mut self.leftover) {
                    Ok(msg) => {
                        debug!(command = msg.command(), "<- {msg}");
                        self.inbound.push_back(msg);
                        ingested.accepted += 1;
                    },
                    Err(e) => reject(ingested, e),
                },
                // No terminator can land early enough any more
                None if self.leftover.len() >= MAX_LINE_LEN => {
                    reject(ingested, ProtocolError::MessageTooLong {
                        size: self.leftover.len(),
                        max: MAX_LINE_LEN,
                    });
                    self.skipping = true;
                    self.keep_partial_terminator();
                    return;
                },
                None => return,
            }
        }
    }

    /// Drop the leftover except a trailing CR, which may pair with the next
    /// read's LF.
    fn keep_partial_terminator(&mut self) {
        let keep = usize::from(self.leftover.last() == Some(&TERMINATOR[0]));
        let discard = self.leftover.len() - keep;
        self.leftover.advance(discard);
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len()).position(|w| w == TERMINATOR)
}

fn reject(ingested: &mut Ingested, e: ProtocolError) {
    warn!(error = %e, "discarding malformed line");
    ingested.rejected.push(e);
}

/// Inbound and outbound message FIFOs plus the partial-line buffer.
///
/// # Invariants
///
/// - After [`SessionQueue::ingest`] returns, the leftover buffer holds no
///   complete CRLF-terminated line and is shorter than [`MAX_LINE_LEN`].
/// - A received line longer than [`MAX_LINE_LEN`] (CRLF included) is
///   rejected once with `ProtocolError::MessageTooLong`, whether or not its
///   terminator has arrived. For an unterminated line `size` is the number
///   of bytes seen so far. Framing resumes after its CRLF.
/// - Every queued outbound message has passed [`Message::validate`], so
///   [`SessionQueue::drain_outbound`] cannot hit an oversize message.
#[derive(Default)]
pub struct SessionQueue {
    queues: RefCell<Queues>,
    message_received: RefCell<Signal<()>>,
}

impl SessionQueue {
    /// Create empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and queue every complete message they finish.
    ///
    /// Fires the message-received notification exactly once, after parsing,
    /// even when no complete message arrived.
    pub fn ingest(&self, bytes: &[u8]) -> Ingested {
        let mut ingested = Ingested::default();
        {
            let mut queues = self.queues.borrow_mut();
            queues.leftover.extend_from_slice(bytes);
            queues.frame(&mut ingested);
        }

        self.notify_received();
        ingested
    }

    /// Queue a message for sending.
    ///
    /// # Errors
    ///
    /// Any [`Message::validate`] failure. The message is not queued.
    pub fn push_outbound(&self, msg: Message) -> Result<(), ProtocolError> {
        msg.validate()?;
        debug!(command = msg.command(), "-> {msg}");
        self.queues.borrow_mut().outbound.push_back(msg);
        Ok(())
    }

    /// Serialize and remove every queued outbound message, in order, as one
    /// buffer. Empty if nothing was queued.
    pub fn drain_outbound(&self) -> Result<Bytes, ProtocolError> {
        let mut queues = self.queues.borrow_mut();
        let len = queues.outbound.iter().map(Message::encoded_len).sum();
        let mut out = BytesMut::with_capacity(len);

        while let Some(msg) = queues.outbound.pop_front() {
            msg.encode(&mut out)?;
        }
        Ok(out.freeze())
    }

    /// Oldest received message, if any.
    pub fn pop_inbound(&self) -> Option<Message> {
        self.queues.borrow_mut().inbound.pop_front()
    }

    /// Number of received messages waiting to be popped.
    pub fn inbound_len(&self) -> usize {
        self.queues.borrow().inbound.len()
    }

    /// Number of messages waiting to be sent.
    pub fn outbound_len(&self) -> usize {
        self.queues.borrow().outbound.len()
    }

    /// True if anything is waiting to be sent.
    pub fn has_outbound(&self) -> bool {
        !self.queues.borrow().outbound.is_empty()
    }

    /// Bytes of an incomplete line held back for the next ingest.
    pub fn leftover_len(&self) -> usize {
        self.queues.borrow().leftover.len()
    }

    /// Connect a handler fired once per [`SessionQueue::ingest`].
    ///
    /// The notification carries no payload; pop the inbound queue to get the
    /// messages.
    pub fn connect_message_received(&self, handler: impl FnMut(()) + 'static) {
        self.message_received.borrow_mut().connect(handler);
    }

    fn notify_received(&self) {
        let mut signal = mem::take(&mut *self.message_received.borrow_mut());
        signal.emit(());

        let mut slot = self.message_received.borrow_mut();
        let connected_meanwhile = mem::replace(&mut *slot, signal);
        slot.append(connected_meanwhile);
    }
}

impl fmt::Debug for SessionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.queues.borrow();
        f.debug_struct("SessionQueue")
            .field("leftover", &queues.leftover.len())
            .field("inbound", &queues.inbound.len())
            .field("outbound", &queues.outbound.len())
            .finish_non_exhaustive()
    }
}
