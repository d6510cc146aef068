//! Connection state and listener callbacks.

use std::fmt;

/// Connection state reported to [`StateListener`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// The bulk phase completed and updates are flowing.
    Connected,
    /// The server closed the connection or the client disconnected.
    Disconnected,
    /// Reading from the server failed.
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Receives every line the server relays after the bulk phase.
///
/// Called from the connector's reader task, so implementations should not
/// block for long.
pub trait UpdateListener: Send + Sync {
    /// Handles one relayed command line.
    fn on_update(&self, line: &str);
}

impl<F> UpdateListener for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_update(&self, line: &str) {
        self(line)
    }
}

/// Receives connection state changes.
pub trait StateListener: Send + Sync {
    /// Handles a state change.
    fn on_state(&self, state: &ConnectionState);
}

impl<F> StateListener for F
where
    F: Fn(&ConnectionState) + Send + Sync,
{
    fn on_state(&self, state: &ConnectionState) {
        self(state)
    }
}
