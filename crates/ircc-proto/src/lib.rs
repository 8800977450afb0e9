//! Wire protocol for ircc.
//!
//! Pure codec for the line-oriented IRC protocol: no sockets, no buffering
//! policy, no knowledge of which commands exist. Callers hand it bytes and
//! get [`Message`]s back, or hand it [`Message`]s and get wire bytes.
//!
//! # Wire format
//!
//! ```text
//! [':' prefix ' '] command [' ' param]* [' :' trailing] CR LF
//! ```
//!
//! A line is at most [`MAX_LINE_LEN`] bytes including the terminator. The
//! final parameter may contain spaces when introduced by `:`; on output the
//! final parameter is *always* written in that form.
//!
//! # Components
//!
//! - [`Message`]: parsed message (prefix, command, parameters)
//! - [`Command`]: verb / numeric-reply classification of a command token
//! - [`ProtocolError`]: framing and validation failures

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
pub mod errors;
mod message;

pub use command::Command;
pub use errors::{ProtocolError, Result};
pub use message::{MAX_LINE_LEN, Message, TERMINATOR};
