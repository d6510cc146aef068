//! Per-connection session handling.
//!
//! ```text
//! Handshake ──► Active ──► Closing
//! ```
//!
//! - `Handshake`: under the database lock, copy the entries and register
//!   the session. The writer task then sends `ACK_STOCKPILE_SERVER`, the
//!   copied entries and `BULK_DONE` before anything else.
//! - `Active`: read one line at a time. A valid command is applied and
//!   fanned out under the database lock; an invalid one is logged and
//!   dropped.
//! - `Closing`: on EOF, read error, eviction or shutdown the session leaves
//!   the registry and its socket is closed.

use crate::config::ServerConfig;
use crate::registry::{
    outbound_channel, OutboundReceiver, SessionHandle, SessionId, SessionRegistry,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use stockpile_core::Database;
use stockpile_protocol::{Entry, BULK_DONE, HANDSHAKE_TOKEN};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// State shared by every session.
pub struct SessionContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The shared database.
    pub db: Arc<Database>,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    shutdown: watch::Receiver<bool>,
}

impl SessionContext {
    /// Creates a new session context.
    pub fn new(
        config: ServerConfig,
        db: Arc<Database>,
        registry: Arc<SessionRegistry>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            db,
            registry,
            shutdown,
        }
    }
}

/// Why a session left the `Active` state.
#[derive(Debug)]
enum CloseReason {
    /// The peer closed its side.
    Eof,
    /// Reading from the socket failed.
    ReadError(io::Error),
    /// The session was evicted or the server is shutting down.
    Closed,
}

/// Handler bound to one accepted socket.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    context: Arc<SessionContext>,
}

impl Session {
    /// Creates a session for a freshly accepted connection.
    pub fn new(context: Arc<SessionContext>, peer: SocketAddr) -> Self {
        let id = context.registry.next_id();
        Self { id, peer, context }
    }

    /// Returns the session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Runs the session to completion.
    pub async fn run(self, stream: TcpStream) {
        let mut shutdown = self.context.shutdown.clone();
        if *shutdown.borrow() {
            return;
        }

        let (read_half, write_half) = stream.into_split();
        let close = Arc::new(Notify::new());

        // Handshake
        let (snapshot, outbound_rx) = self.register(Arc::clone(&close));
        info!(
            session = %self.id,
            peer = %self.peer,
            entries = snapshot.len(),
            "session attached"
        );
        let writer = tokio::spawn(write_loop(
            self.id,
            write_half,
            snapshot,
            outbound_rx,
            Arc::clone(&close),
        ));

        // Active
        let mut segments = BufReader::new(read_half).split(b'\n');
        let reason = loop {
            tokio::select! {
                _ = close.notified() => break CloseReason::Closed,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break CloseReason::Closed;
                    }
                }
                segment = segments.next_segment() => match segment {
                    Ok(Some(bytes)) => match decode_line(bytes) {
                        Ok(line) => self.handle_line(line),
                        Err(raw) => warn!(
                            session = %self.id,
                            line = %raw,
                            "discarding line that is not valid UTF-8"
                        ),
                    },
                    Ok(None) => break CloseReason::Eof,
                    Err(err) => break CloseReason::ReadError(err),
                },
            }
        };

        // Closing
        self.context.registry.remove(self.id);
        match reason {
            CloseReason::Eof => {
                // The registry held the only sender, so the writer drains
                // whatever is queued and then shuts the socket down.
                let _ = writer.await;
                info!(session = %self.id, peer = %self.peer, "session closed by peer");
            }
            CloseReason::ReadError(err) => {
                writer.abort();
                info!(session = %self.id, peer = %self.peer, error = %err, "session read failed");
            }
            CloseReason::Closed => {
                writer.abort();
                info!(session = %self.id, peer = %self.peer, "session closed");
            }
        }
    }

    /// Copies the entries and registers the session in one critical section.
    ///
    /// Every command applied after this point is queued for the session,
    /// and none applied before it is, so the snapshot and the relayed
    /// updates never overlap or leave a gap.
    fn register(&self, close: Arc<Notify>) -> (Vec<Entry>, OutboundReceiver) {
        let (outbound, outbound_rx) = outbound_channel(self.context.config.outbound_queue_capacity);
        let handle = SessionHandle::new(self.id, self.peer, outbound, close);
        let snapshot = self.context.db.with_snapshot(|entries| {
            self.context.registry.insert(handle);
            entries.to_vec()
        });
        (snapshot, outbound_rx)
    }

    /// Applies one client line and relays it to every other session.
    fn handle_line(&self, line: String) {
        let line: Arc<str> = Arc::from(line);
        let registry = &self.context.registry;

        let result = self
            .context
            .db
            .apply_and_then(&line, |_| registry.broadcast(self.id, &line));

        match result {
            Ok((command, undeliverable)) => {
                debug!(session = %self.id, command = %command, "applied command");
                for id in undeliverable {
                    warn!(session = %id, "evicting peer that cannot keep up");
                    registry.evict(id);
                }
            }
            Err(err) => {
                warn!(session = %self.id, line = %line, error = %err, "discarding malformed line");
            }
        }
    }
}

/// Turns one raw segment into a line, dropping a trailing `\r`.
///
/// On invalid UTF-8 the lossy text is returned as the error for logging.
fn decode_line(mut bytes: Vec<u8>) -> Result<String, String> {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    String::from_utf8(bytes)
        .map_err(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Sends the bulk phase, then every queued line, in order.
///
/// This task is the only writer of the socket, which is what keeps lines
/// from different sources from interleaving.
async fn write_loop(
    id: SessionId,
    write_half: OwnedWriteHalf,
    snapshot: Vec<Entry>,
    mut outbound: OutboundReceiver,
    close: Arc<Notify>,
) {
    let mut writer = BufWriter::new(write_half);

    let result = async {
        write_line(&mut writer, HANDSHAKE_TOKEN).await?;
        for entry in &snapshot {
            write_line(&mut writer, &entry.to_wire()).await?;
        }
        write_line(&mut writer, BULK_DONE).await?;
        writer.flush().await?;

        while let Some(line) = outbound.recv().await {
            write_line(&mut writer, &line).await?;
            writer.flush().await?;
        }
        writer.shutdown().await
    }
    .await;

    if let Err(err) = result {
        debug!(session = %id, error = %err, "session write failed");
        close.notify_one();
    }
}

async fn write_line(writer: &mut BufWriter<OwnedWriteHalf>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}
