//! # Stockpile Core
//!
//! The shared entry database and its on-disk file.
//!
//! ## Architecture
//!
//! - [`Database`] holds the ordered entry list behind a single mutex together
//!   with the dirty state. All mutations go through the command codec.
//! - [`EntryFile`] owns the on-disk file: it holds an advisory lock for the
//!   lifetime of the server, loads entries at startup and rewrites the file
//!   atomically on flush.
//!
//! ## Key Invariants
//!
//! - The in-memory order equals the persisted order and the snapshot order
//! - The database is dirty iff a command succeeded since the last completed
//!   write
//! - The entry list is never exposed outside the guard

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod database;
mod error;
mod store;

pub use database::{Database, FlushTicket};
pub use error::{CoreError, CoreResult};
pub use store::{read_entries, EntryFile, LoadReport, SkippedLine};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
