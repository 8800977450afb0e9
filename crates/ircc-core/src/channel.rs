//! Buffered non-blocking socket channel.
//!
//! Wraps a stream socket with an inbound FIFO of received chunks and an
//! outbound FIFO of pending writes. Nothing touches the socket until
//! [`BufferedChannel::drain_pending`], which is meant to be called from the
//! reactor's polled handler for the channel's descriptor.
//!
//! # Invariants
//!
//! - Demand-driven writability: [`BufferedChannel::interest`] includes
//!   `WRITABLE` only while the outbound FIFO is non-empty.
//!
//! - Closure is monotonic. Once a zero-length read, hang-up or error is
//!   observed the channel stays closed and performs no further reads.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::{Shutdown, TcpStream},
    os::{
        fd::{AsRawFd, RawFd},
        unix::net::UnixStream,
    },
};

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace};

use crate::{
    error::ChannelError,
    reactor::{Interest, Readiness},
    sys,
};

const READ_CHUNK: usize = 4096;

/// Stream socket usable by a [`BufferedChannel`].
pub trait Stream: Read + Write + AsRawFd {
    /// Switch the socket between blocking and non-blocking mode.
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;

    /// Shut down both directions.
    fn shutdown(&self) -> io::Result<()>;
}

impl Stream for TcpStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

impl Stream for UnixStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        UnixStream::set_nonblocking(self, nonblocking)
    }

    fn shutdown(&self) -> io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }
}

/// Socket plus inbound and outbound byte queues.
///
/// Owns the stream; dropping the channel closes the socket.
#[derive(Debug)]
pub struct BufferedChannel<S> {
    stream: S,
    closed: bool,
    inbound: VecDeque<Bytes>,
    outbound: VecDeque<Bytes>,
}

impl<S: Stream> BufferedChannel<S> {
    /// Take ownership of `stream` and switch it to non-blocking mode.
    pub fn new(stream: S) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { stream, closed: false, inbound: VecDeque::new(), outbound: VecDeque::new() })
    }

    /// Raw descriptor of the underlying socket.
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    /// Directions the reactor should monitor for this channel right now.
    pub fn interest(&self) -> Interest {
        if self.closed {
            Interest::empty()
        } else if self.has_pending_write() {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    /// Queue bytes for sending. Nothing is written until the next
    /// [`BufferedChannel::drain_pending`]. Empty input is ignored.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Closed` if the channel has already closed
    pub fn enqueue_write(&mut self, data: impl Into<Bytes>) -> Result<(), ChannelError> {
        let data = data.into();
        if data.is_empty() {
            return Ok(());
        }
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.outbound.push_back(data);
        Ok(())
    }

    /// True if queued bytes are waiting to be sent.
    pub fn has_pending_write(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// True if a received chunk is waiting to be popped.
    pub fn readable_for_pop(&self) -> bool {
        !self.inbound.is_empty()
    }

    /// Oldest received chunk, if any.
    pub fn pop_received(&mut self) -> Option<Bytes> {
        self.inbound.pop_front()
    }

    /// True once the peer closed or the socket failed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Move bytes between the socket and the queues.
    ///
    /// Polls the socket once without waiting. If readable, reads until the
    /// socket would block and pushes everything read as one chunk. If
    /// writable, sends every queued item in order, waiting for buffer space
    /// when the kernel pushes back. Hang-up or error marks the channel closed.
    ///
    /// No-op once the channel is closed.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Io` for any failure other than would-block,
    ///   interruption or the peer going away
    pub fn drain_pending(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }

        let revents = sys::poll_one(self.fd(), self.interest().poll_events(), sys::IMMEDIATE)?;
        let readiness = Readiness::from_revents(revents);
        trace!(fd = self.fd(), ?readiness, "draining channel");

        if readiness.contains(Readiness::READABLE) {
            self.receive()?;
        }
        if !self.closed && readiness.contains(Readiness::WRITABLE) {
            self.flush()?;
        }
        if readiness.contains(Readiness::ERROR) && !self.closed {
            debug!(fd = self.fd(), "socket hung up");
            self.closed = true;
        }

        Ok(())
    }

    /// Shut the socket down and mark the channel closed. Queued output is
    /// discarded.
    pub fn shutdown(&mut self) -> io::Result<()> {
        self.closed = true;
        self.outbound.clear();
        match self.stream.shutdown() {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }

    fn receive(&mut self) -> Result<(), ChannelError> {
        let mut chunk = BytesMut::new();
        let mut buf = [0u8; READ_CHUNK];

        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    debug!(fd = self.fd(), "peer closed connection");
                    self.closed = true;
                    break;
                },
                Ok(n) => chunk.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if is_peer_gone(&e) => {
                    debug!(fd = self.fd(), error = %e, "connection reset");
                    self.closed = true;
                    break;
                },
                Err(e) => return Err(e.into()),
            }
        }

        if !chunk.is_empty() {
            trace!(fd = self.fd(), len = chunk.len(), "received");
            self.inbound.push_back(chunk.freeze());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        while let Some(mut data) = self.outbound.pop_front() {
            while data.has_remaining() {
                match self.stream.write(&data) {
                    Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                    Ok(n) => data.advance(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        sys::poll_one(self.fd(), libc::POLLOUT, sys::INFINITE)?;
                    },
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                    Err(e) if is_peer_gone(&e) => {
                        debug!(fd = self.fd(), error = %e, "peer gone while sending");
                        self.closed = true;
                        self.outbound.clear();
                        return Ok(());
                    },
                    Err(e) => return Err(e.into()),
                }
            }
        }
        trace!(fd = self.fd(), "outbound queue flushed");
        Ok(())
    }
}

fn is_peer_gone(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe)
}
