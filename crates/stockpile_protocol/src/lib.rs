//! # Stockpile Protocol
//!
//! Entry wire form and line command codec for Stockpile.
//!
//! This crate provides:
//! - [`Entry`], the immutable inventory record, and its self-delimiting
//!   wire form (`HEX(nameLen)|HEX(flags)|name++location`)
//! - [`Command`], the one-line mutations `+E`, `-E` and `>LEN>E1E2`
//! - The handshake and bulk-phase tokens shared by server and client
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod command;
mod entry;
mod error;
mod wire;

pub use command::{apply, Command};
pub use entry::{Entry, FLAG_MISSING};
pub use error::{ProtocolError, ProtocolResult};
pub use wire::{is_line_safe, BULK_DONE, DEFAULT_DB_FILENAME, DEFAULT_PORT, HANDSHAKE_TOKEN};
