//! Terminal IRC client.
//!
//! Collaborators layered on the `ircc-core` transport: configuration, the
//! command-response table, the terminal frontend and the session wiring that
//! ties them to one [`ircc_core::Reactor`]. The `ircc` binary is a thin
//! `main` over [`Client`].
//!
//! # Components
//!
//! - [`Config`]: server address and login credentials
//! - [`ResponseTable`] / [`MessageHook`]: what to do about received commands
//! - [`Frontend`]: local input to messages, messages to printed lines
//! - [`Client`]: one session over a socket, local input and an output sink

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod error;
mod frontend;
pub mod responses;

pub use client::Client;
pub use config::{Config, DEFAULT_PORT, DEFAULT_REALNAME};
pub use error::ClientError;
pub use frontend::Frontend;
pub use responses::{Interaction, MessageHook, ResponseTable};
