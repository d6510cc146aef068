//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing entries or commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// An entry's wire form could not be parsed.
    #[error("bad entry encoding: {message}")]
    BadEntryEncoding {
        /// Description of the encoding error.
        message: String,
    },

    /// A command line could not be parsed.
    #[error("bad command: {message}")]
    BadCommand {
        /// Description of the command error.
        message: String,
    },
}

impl ProtocolError {
    /// Create a bad entry encoding error.
    pub fn bad_entry(message: impl Into<String>) -> Self {
        Self::BadEntryEncoding {
            message: message.into(),
        }
    }

    /// Create a bad command error.
    pub fn bad_command(message: impl Into<String>) -> Self {
        Self::BadCommand {
            message: message.into(),
        }
    }
}
