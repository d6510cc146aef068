//! TCP connector to a Stockpile server.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::listener::{ConnectionState, StateListener, UpdateListener};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stockpile_protocol::{is_line_safe, BULK_DONE, HANDSHAKE_TOKEN};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State shared with the background reader task.
#[derive(Default)]
struct Shared {
    open: AtomicBool,
    update_listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
    state_listeners: RwLock<Vec<Arc<dyn StateListener>>>,
}

impl Shared {
    fn emit_update(&self, line: &str) {
        for listener in self.update_listeners.read().iter() {
            listener.on_update(line);
        }
    }

    fn emit_state(&self, state: ConnectionState) {
        for listener in self.state_listeners.read().iter() {
            listener.on_state(&state);
        }
    }
}

/// Client side of one connection to a Stockpile server.
///
/// # Example
///
/// ```rust,ignore
/// use stockpile_client::{ClientConfig, ServerConnection};
///
/// let conn = ServerConnection::new(ClientConfig::new("localhost", 2377));
/// conn.add_update_listener(|line: &str| println!("update: {line}"));
/// let snapshot = conn.connect_and_fetch_snapshot().await?;
/// conn.send("+3|0|fookitchen").await?;
/// ```
pub struct ServerConnection {
    config: ClientConfig,
    shared: Arc<Shared>,
    started: AtomicBool,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ServerConnection {
    /// Creates a connector; no connection is made yet.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            started: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    /// Returns the connector configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Registers a listener for relayed updates.
    pub fn add_update_listener(&self, listener: impl UpdateListener + 'static) {
        self.shared
            .update_listeners
            .write()
            .push(Arc::new(listener));
    }

    /// Registers a listener for connection state changes.
    pub fn add_state_listener(&self, listener: impl StateListener + 'static) {
        self.shared.state_listeners.write().push(Arc::new(listener));
    }

    /// Returns true while the connection is usable for [`send`](Self::send).
    pub fn is_connected(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Connects, validates the handshake and collects the bulk snapshot.
    ///
    /// Returns the snapshot lines in server order. Once this returns, a
    /// background task dispatches every further line to the update
    /// listeners, and `Connected` has been emitted.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AlreadyConnected`] if called a second time
    /// - [`ClientError::HandshakeFailed`] if the first line is not the
    ///   handshake token or the stream ends before `BULK_DONE`; the socket
    ///   is closed
    /// - [`ClientError::Io`] if connecting or reading fails
    pub async fn connect_and_fetch_snapshot(&self) -> ClientResult<Vec<String>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }

        match self.handshake().await {
            Ok((lines, write_half, snapshot)) => {
                *self.writer.lock().await = Some(write_half);
                self.shared.open.store(true, Ordering::SeqCst);
                info!(server = %self.config, entries = snapshot.len(), "connected");
                self.shared.emit_state(ConnectionState::Connected);

                let task = tokio::spawn(read_loop(lines, Arc::clone(&self.shared)));
                *self.reader.lock() = Some(task);
                Ok(snapshot)
            }
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                warn!(server = %self.config, error = %err, "connection failed");
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
    ) -> ClientResult<(Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf, Vec<String>)> {
        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        match lines.next_line().await? {
            Some(line) if line == HANDSHAKE_TOKEN => {}
            Some(line) => {
                return Err(ClientError::HandshakeFailed(format!(
                    "expected {HANDSHAKE_TOKEN}, got {line:?}"
                )));
            }
            None => {
                return Err(ClientError::HandshakeFailed(
                    "connection closed before handshake".into(),
                ));
            }
        }

        let mut snapshot = Vec::new();
        loop {
            match lines.next_line().await? {
                Some(line) if line == BULK_DONE => break,
                Some(line) => snapshot.push(line),
                None => {
                    return Err(ClientError::HandshakeFailed(
                        "connection closed during bulk phase".into(),
                    ));
                }
            }
        }

        Ok((lines, write_half, snapshot))
    }

    /// Sends one command line.
    ///
    /// Sends from concurrent callers never interleave.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidArgument`] if `line` is empty or contains a
    ///   line break
    /// - [`ClientError::NotConnected`] if there is no open connection
    /// - [`ClientError::Io`] if the write fails; the connection is then
    ///   considered closed
    pub async fn send(&self, line: &str) -> ClientResult<()> {
        if !is_line_safe(line) {
            return Err(ClientError::InvalidArgument(format!(
                "line must be non-empty and contain no line breaks: {line:?}"
            )));
        }

        let mut writer = self.writer.lock().await;
        let write_half = match writer.as_mut() {
            Some(w) if self.is_connected() => w,
            _ => return Err(ClientError::NotConnected),
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        if let Err(err) = write_half.write_all(&buf).await {
            self.shared.open.store(false, Ordering::SeqCst);
            *writer = None;
            return Err(err.into());
        }
        debug!(line = %line, "sent");
        Ok(())
    }

    /// Closes the connection.
    ///
    /// Emits `Disconnected` if the connection was open.
    pub async fn disconnect(&self) {
        let was_open = self.shared.open.swap(false, Ordering::SeqCst);
        let reader = self.reader.lock().take();
        if let Some(task) = reader {
            task.abort();
        }
        let writer = self.writer.lock().await.take();
        if let Some(mut write_half) = writer {
            let _ = write_half.shutdown().await;
        }
        if was_open {
            info!(server = %self.config, "disconnected");
            self.shared.emit_state(ConnectionState::Disconnected);
        }
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        if let Some(task) = self.reader.get_mut().take() {
            task.abort();
        }
    }
}

/// Dispatches relayed lines until the server closes or a read fails.
async fn read_loop(mut lines: Lines<BufReader<OwnedReadHalf>>, shared: Arc<Shared>) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => shared.emit_update(&line),
            Ok(None) => {
                if shared.open.swap(false, Ordering::SeqCst) {
                    info!("server closed the connection");
                    shared.emit_state(ConnectionState::Disconnected);
                }
                break;
            }
            Err(err) => {
                if shared.open.swap(false, Ordering::SeqCst) {
                    warn!(error = %err, "connection read failed");
                    shared.emit_state(ConnectionState::Error(err.to_string()));
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Accepts one connection, writes `script` and returns the socket.
    async fn fake_server(script: &'static str) -> (ClientConfig, JoinHandle<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig::from(listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(script.as_bytes()).await.unwrap();
            stream
        });
        (config, task)
    }

    fn record_states(conn: &ServerConnection) -> mpsc::UnboundedReceiver<ConnectionState> {
        let (tx, rx) = mpsc::unbounded_channel();
        conn.add_state_listener(move |state: &ConnectionState| {
            let _ = tx.send(state.clone());
        });
        rx
    }

    #[tokio::test]
    async fn fetches_snapshot() {
        let (config, server) =
            fake_server("ACK_STOCKPILE_SERVER\n3|0|fookitchen\n3|1|bargarage\nBULK_DONE\n").await;
        let conn = ServerConnection::new(config);
        let mut states = record_states(&conn);

        let snapshot = conn.connect_and_fetch_snapshot().await.unwrap();
        assert_eq!(snapshot, vec!["3|0|fookitchen", "3|1|bargarage"]);
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));
        assert!(conn.is_connected());
        drop(server);
    }

    #[tokio::test]
    async fn rejects_wrong_handshake() {
        let (config, server) = fake_server("HELLO\n").await;
        let conn = ServerConnection::new(config);
        let mut states = record_states(&conn);

        let err = conn.connect_and_fetch_snapshot().await.unwrap_err();
        assert!(matches!(err, ClientError::HandshakeFailed(_)));
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.send("+1|0|ax").await,
            Err(ClientError::NotConnected)
        ));

        // The client dropped its socket, so the server sees EOF.
        let mut stream = server.await.unwrap();
        let mut buf = [0u8; 8];
        let n = tokio::io::AsyncReadExt::read(&mut stream, &mut buf)
            .await
            .unwrap_or(0);
        assert_eq!(n, 0);
        assert!(states.try_recv().is_err());
    }

    #[tokio::test]
    async fn eof_during_bulk_phase_fails_handshake() {
        let (config, server) = fake_server("ACK_STOCKPILE_SERVER\n1|0|ax\n").await;
        let conn = ServerConnection::new(config);
        let task = tokio::spawn(async move { conn.connect_and_fetch_snapshot().await });
        drop(server.await.unwrap());

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::HandshakeFailed(_)));
    }

    #[tokio::test]
    async fn dispatches_updates_then_disconnects() {
        let (config, server) = fake_server("ACK_STOCKPILE_SERVER\nBULK_DONE\n").await;
        let conn = ServerConnection::new(config);
        let (tx, mut updates) = mpsc::unbounded_channel();
        conn.add_update_listener(move |line: &str| {
            let _ = tx.send(line.to_string());
        });
        let mut states = record_states(&conn);

        assert!(conn.connect_and_fetch_snapshot().await.unwrap().is_empty());
        let mut stream = server.await.unwrap();
        stream.write_all(b"+1|0|ax\n-1|0|ax\n").await.unwrap();

        assert_eq!(updates.recv().await.as_deref(), Some("+1|0|ax"));
        assert_eq!(updates.recv().await.as_deref(), Some("-1|0|ax"));

        drop(stream);
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn send_writes_lines() {
        let (config, server) = fake_server("ACK_STOCKPILE_SERVER\nBULK_DONE\n").await;
        let conn = ServerConnection::new(config);
        conn.connect_and_fetch_snapshot().await.unwrap();
        let stream = server.await.unwrap();

        conn.send("+1|0|ax").await.unwrap();
        conn.send(">6>1|0|ax1|0|by").await.unwrap();

        let mut lines = BufReader::new(stream).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("+1|0|ax"));
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some(">6>1|0|ax1|0|by")
        );
    }

    #[tokio::test]
    async fn send_rejects_invalid_lines() {
        let conn = ServerConnection::new(ClientConfig::default());
        assert!(matches!(
            conn.send("").await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            conn.send("+1|0|ax\n+1|0|by").await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            conn.send("+1|0|ax").await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let (config, _server) = fake_server("ACK_STOCKPILE_SERVER\nBULK_DONE\n").await;
        let conn = ServerConnection::new(config);
        conn.connect_and_fetch_snapshot().await.unwrap();
        assert!(matches!(
            conn.connect_and_fetch_snapshot().await,
            Err(ClientError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_emits_state_once() {
        let (config, _server) = fake_server("ACK_STOCKPILE_SERVER\nBULK_DONE\n").await;
        let conn = ServerConnection::new(config);
        let mut states = record_states(&conn);
        conn.connect_and_fetch_snapshot().await.unwrap();

        conn.disconnect().await;
        conn.disconnect().await;
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(states.try_recv().is_err());
        assert!(matches!(
            conn.send("+1|0|ax").await,
            Err(ClientError::NotConnected)
        ));
    }
}
