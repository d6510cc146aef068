//! # Stockpile Client
//!
//! Connector for Stockpile servers.
//!
//! This crate provides:
//! - [`ServerConnection`]: handshake, bulk snapshot, background update
//!   dispatch and serialized sends
//! - Listener traits for updates and connection state
//! - [`Replica`]: a local copy of the entry list driven by relayed updates
//!
//! ## Lifecycle
//!
//! 1. `connect_and_fetch_snapshot()` validates `ACK_STOCKPILE_SERVER` and
//!    returns the lines up to `BULK_DONE`
//! 2. `Connected` is emitted and a reader task starts dispatching updates
//! 3. EOF emits `Disconnected`; a read error emits `Error`

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod connection;
mod error;
mod listener;
mod replica;

pub use config::ClientConfig;
pub use connection::ServerConnection;
pub use error::{ClientError, ClientResult};
pub use listener::{ConnectionState, StateListener, UpdateListener};
pub use replica::Replica;
