//! Raw line client for driving a server in tests.

use std::net::SocketAddr;
use std::time::Duration;
use stockpile_protocol::{BULK_DONE, HANDSHAKE_TOKEN};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// How long a test waits for a line before failing.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long [`LineClient::expect_silence`] listens.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(200);

/// A plain TCP client speaking the line protocol without any validation.
pub struct LineClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    /// Connects to `addr`.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        stream.set_nodelay(true).expect("Failed to set TCP_NODELAY");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    /// Connects and consumes the bulk phase, returning the snapshot lines.
    pub async fn attach(addr: SocketAddr) -> (Self, Vec<String>) {
        let mut client = Self::connect(addr).await;
        let snapshot = client.read_bulk().await;
        (client, snapshot)
    }

    /// Reads the next line, failing the test on timeout or EOF.
    pub async fn read_line(&mut self) -> String {
        self.try_read_line()
            .await
            .expect("Connection closed while waiting for a line")
    }

    /// Reads the next line; `None` on EOF.
    pub async fn try_read_line(&mut self) -> Option<String> {
        timeout(READ_TIMEOUT, self.lines.next_line())
            .await
            .expect("Timed out waiting for a line")
            .expect("Failed to read line")
    }

    /// Reads the handshake and the snapshot, returning the snapshot lines.
    pub async fn read_bulk(&mut self) -> Vec<String> {
        assert_eq!(self.read_line().await, HANDSHAKE_TOKEN);
        let mut snapshot = Vec::new();
        loop {
            let line = self.read_line().await;
            if line == BULK_DONE {
                return snapshot;
            }
            snapshot.push(line);
        }
    }

    /// Asserts that nothing arrives within [`SILENCE_WINDOW`].
    pub async fn expect_silence(&mut self) {
        if let Ok(Ok(Some(line))) = timeout(SILENCE_WINDOW, self.lines.next_line()).await {
            panic!("expected no traffic, got {line:?}");
        }
    }

    /// Waits until the server closes the connection.
    pub async fn expect_eof(&mut self) {
        match timeout(READ_TIMEOUT, self.lines.next_line()).await {
            Ok(Ok(None)) | Ok(Err(_)) => {}
            Ok(Ok(Some(line))) => panic!("expected EOF, got {line:?}"),
            Err(_) => panic!("timed out waiting for EOF"),
        }
    }

    /// Sends one line.
    pub async fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Sends raw bytes, e.g. to exercise `\r\n` handling.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer
            .write_all(bytes)
            .await
            .expect("Failed to write to server");
    }

    /// Closes the write side, signalling EOF to the server.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}
