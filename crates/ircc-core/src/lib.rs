//! Transport core for ircc.
//!
//! Single-threaded, callback-driven plumbing between a server socket, local
//! input and the protocol codec. No async runtime: one [`Reactor`] blocks in
//! `poll(2)` and dispatches readiness to handlers, which move bytes through a
//! [`BufferedChannel`] and messages through a [`SessionQueue`].
//!
//! # Architecture
//!
//! ```text
//!            ┌────────────────────────────── Reactor ──────────────────────────────┐
//!  socket ──>│ polled ──> BufferedChannel ──chunks──> SessionQueue ──> on_received │
//!            │                    ^                          │                    │
//!            │                    └────── drain_outbound ────┘<── push_outbound   │
//!            └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`Signal`]: ordered multicast callbacks
//! - [`Reactor`]: watched-descriptor table and the poll/dispatch loop
//! - [`BufferedChannel`]: non-blocking socket with inbound and outbound queues
//! - [`SessionQueue`]: partial-line buffering and message FIFOs

#![deny(missing_docs)]

mod channel;
pub mod error;
mod reactor;
mod session;
mod signal;
mod sys;

pub use channel::{BufferedChannel, Stream};
pub use error::{ChannelError, ReactorError};
pub use reactor::{Interest, Reactor, Readiness};
pub use session::{Ingested, SessionQueue};
pub use signal::Signal;
