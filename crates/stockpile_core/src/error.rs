//! Error types for Stockpile core.

use std::io;
use std::path::PathBuf;
use stockpile_protocol::ProtocolError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A command or entry line failed to parse.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the entry file.
    #[error("database locked: another process has exclusive access to {}", path.display())]
    DatabaseLocked {
        /// Path of the lock file.
        path: PathBuf,
    },

    /// The entry file path cannot be used.
    #[error("invalid path: {message}")]
    InvalidPath {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Create an invalid path error.
    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }
}
