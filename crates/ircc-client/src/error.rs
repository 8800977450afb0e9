//! Client error types.

use std::io;

use ircc_core::ReactorError;
use ircc_proto::ProtocolError;
use thiserror::Error;

/// Errors that end a client session or prevent it from starting.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Command-line configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Could not reach the server
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// `host:port` that was tried
        addr: String,
        /// Underlying failure
        #[source]
        source: io::Error,
    },

    /// Reactor failed while polling or dispatching
    #[error("reactor error: {0}")]
    Reactor(#[from] ReactorError),

    /// An outbound message could not be serialized
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
