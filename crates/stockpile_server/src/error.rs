//! Error types for the server.

use std::net::SocketAddr;
use stockpile_core::CoreError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Database or entry file error.
    #[error("database error: {0}")]
    Core(#[from] CoreError),

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this error prevents the server from starting.
    pub fn is_startup_error(&self) -> bool {
        matches!(self, ServerError::Bind { .. } | ServerError::Core(_))
    }
}
