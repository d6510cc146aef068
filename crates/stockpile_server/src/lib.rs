//! # Stockpile Server
//!
//! TCP replication server for the Stockpile entry database.
//!
//! This crate provides:
//! - The listener and per-connection sessions
//! - Fan-out of every accepted command to all other sessions
//! - A periodic writer that persists the database while it is dirty
//!
//! # Protocol
//!
//! Every connection goes through the same phases:
//! 1. Server sends `ACK_STOCKPILE_SERVER`, one wire entry per line, then
//!    `BULK_DONE`
//! 2. Client sends `+E`, `-E` or `>LEN>E1E2` lines
//! 3. Each valid line is applied and relayed verbatim to every other client
//!
//! # Example
//!
//! ```rust,ignore
//! use stockpile_server::{Server, ServerConfig};
//!
//! let config = ServerConfig::default().with_db_path("entries.db");
//! let server = Server::bind(config).await?;
//! server.run(tokio::signal::ctrl_c()).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod persistence;
mod registry;
mod server;
mod session;

pub use config::{ServerConfig, DEFAULT_FLUSH_INTERVAL};
pub use error::{ServerError, ServerResult};
pub use persistence::PersistenceWriter;
pub use registry::{SessionId, SessionRegistry};
pub use server::{Server, ServerHandle};
pub use session::{Session, SessionContext};
