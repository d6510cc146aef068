//! Error types for the client connector.

use stockpile_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur on the client side of a connection.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server did not open with the expected handshake or closed the
    /// connection before the bulk phase ended.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// No open connection.
    #[error("not connected to server")]
    NotConnected,

    /// The connector already holds a connection.
    #[error("already connected")]
    AlreadyConnected,

    /// The caller passed a line that cannot be sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A received line could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Returns true if the connection is gone and a new one is needed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected | ClientError::Io(_) | ClientError::HandshakeFailed(_)
        )
    }
}
