//! Error types for the transport core.
//!
//! Two layers: the reactor (polling and dispatch) and the buffered channel
//! (socket I/O). Peer closure is not an error at either layer; it shows up
//! as [`crate::BufferedChannel::is_closed`] and is handled by the caller.

use std::{io, os::fd::RawFd};

use thiserror::Error;

/// Errors raised by [`crate::Reactor`].
#[derive(Error, Debug)]
pub enum ReactorError {
    /// Operation referenced a descriptor that is not in the watched set
    #[error("descriptor {0} is not watched")]
    NotWatched(RawFd),

    /// The blocking wait itself failed
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    /// A polled handler reported an unrecoverable I/O failure
    #[error("handler for descriptor {fd} failed: {source}")]
    Handler {
        /// Descriptor whose handler failed
        fd: RawFd,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}

/// Errors raised by [`crate::BufferedChannel`].
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Send or receive failed with something other than "would block"
    #[error("channel I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Write enqueued after the channel closed
    #[error("channel is closed")]
    Closed,
}

impl From<ChannelError> for io::Error {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Io(e) => e,
            ChannelError::Closed => io::Error::new(io::ErrorKind::NotConnected, err.to_string()),
        }
    }
}
