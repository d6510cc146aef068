//! Shared fixture for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stockpile_core::Database;
use stockpile_server::{Server, ServerConfig, ServerHandle};
use stockpile_testkit::{LineClient, TempEntryFile};

/// A server on `127.0.0.1:0` backed by a temporary entry file.
pub struct TestServer {
    pub file: TempEntryFile,
    handle: ServerHandle,
}

impl TestServer {
    /// Starts a server on an empty file with a long flush interval.
    pub async fn start() -> Self {
        Self::start_with(TempEntryFile::empty(), |config| config).await
    }

    /// Starts a server whose file holds `contents`.
    pub async fn with_contents(contents: &str) -> Self {
        Self::start_with(TempEntryFile::with_contents(contents), |config| config).await
    }

    /// Starts a server after letting the caller adjust the config.
    pub async fn start_with(
        file: TempEntryFile,
        configure: impl FnOnce(ServerConfig) -> ServerConfig,
    ) -> Self {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_db_path(file.path())
            .with_flush_interval(Duration::from_secs(3600));
        let server = Server::bind(configure(config)).await.unwrap();
        let handle = server.spawn().unwrap();
        Self { file, handle }
    }

    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    pub fn db(&self) -> Arc<Database> {
        self.handle.database()
    }

    pub fn session_count(&self) -> usize {
        self.handle.session_count()
    }

    /// Connects a raw client and consumes its bulk phase.
    pub async fn attach(&self) -> (LineClient, Vec<String>) {
        LineClient::attach(self.addr()).await
    }

    /// Waits until the server has exactly `n` live sessions.
    pub async fn wait_for_sessions(&self, n: usize) {
        for _ in 0..200 {
            if self.session_count() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} sessions, have {}", self.session_count());
    }

    /// Stops the server and returns the entry file fixture for inspection.
    pub async fn stop(self) -> TempEntryFile {
        self.handle.shutdown().await.unwrap();
        self.file
    }
}
