//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use stockpile_protocol::{DEFAULT_DB_FILENAME, DEFAULT_PORT};

/// Default period of the persistence writer.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Path of the entry file.
    pub db_path: PathBuf,
    /// How often the persistence writer checks the dirty flag.
    pub flush_interval: Duration,
    /// Per-session outbound queue limit.
    ///
    /// `None` never drops a line; a slow peer only grows its own queue.
    /// `Some(n)` disconnects a peer whose queue already holds `n` lines.
    pub outbound_queue_capacity: Option<usize>,
    /// Whether the writer makes one last flush attempt on shutdown.
    pub flush_on_shutdown: bool,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            db_path: PathBuf::from(DEFAULT_DB_FILENAME),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            outbound_queue_capacity: None,
            flush_on_shutdown: true,
        }
    }

    /// Sets the entry file path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Sets the flush interval.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Bounds every session's outbound queue.
    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = Some(capacity.max(1));
        self
    }

    /// Enables or disables the final flush on shutdown.
    pub fn with_flush_on_shutdown(mut self, enabled: bool) -> Self {
        self.flush_on_shutdown = enabled;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 2377);
        assert_eq!(config.db_path, PathBuf::from("entries.db"));
        assert_eq!(config.flush_interval, Duration::from_secs(900));
        assert!(config.outbound_queue_capacity.is_none());
        assert!(config.flush_on_shutdown);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_db_path("/tmp/stock.db")
            .with_flush_interval(Duration::from_millis(100))
            .with_outbound_queue_capacity(0)
            .with_flush_on_shutdown(false);

        assert_eq!(config.db_path, PathBuf::from("/tmp/stock.db"));
        assert_eq!(config.flush_interval, Duration::from_millis(100));
        assert_eq!(config.outbound_queue_capacity, Some(1));
        assert!(!config.flush_on_shutdown);
    }
}
