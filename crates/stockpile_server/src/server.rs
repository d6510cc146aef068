//! Listener, startup sequencing and shutdown.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::persistence::PersistenceWriter;
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionContext};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use stockpile_core::{Database, EntryFile};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// The replication server.
///
/// Startup is split from serving so callers can learn the bound address
/// (useful with port 0) before the accept loop runs.
///
/// # Example
///
/// ```rust,ignore
/// use stockpile_server::{Server, ServerConfig};
///
/// let server = Server::bind(ServerConfig::default()).await?;
/// server.run(tokio::signal::ctrl_c()).await?;
/// ```
pub struct Server {
    listener: TcpListener,
    file: Arc<EntryFile>,
    context: Arc<SessionContext>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Loads the entry file and binds the listening socket.
    ///
    /// The entry file is created if missing. Unparseable lines are logged
    /// and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry file cannot be created, read or
    /// locked, or if the address cannot be bound.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let file = EntryFile::open(&config.db_path)?;
        let report = file.load()?;
        info!(
            path = %config.db_path.display(),
            entries = report.entries.len(),
            skipped = report.skipped.len(),
            "database loaded"
        );
        let db = Arc::new(Database::from_entries(report.entries));

        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(SessionRegistry::new());
        let context = Arc::new(SessionContext::new(config, db, registry, shutdown_rx));

        Ok(Self {
            listener,
            file: Arc::new(file),
            context,
            shutdown_tx,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the shared database.
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.context.db)
    }

    /// Returns the live session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.context.registry)
    }

    /// Serves until `shutdown` completes or the listener fails.
    ///
    /// Either way every live session is closed and the persistence writer
    /// is stopped (with a final flush unless disabled) before returning.
    ///
    /// # Errors
    ///
    /// Returns the listener error if the accept loop died.
    pub async fn run(self, shutdown: impl Future) -> ServerResult<()> {
        let config = &self.context.config;
        let writer = PersistenceWriter::new(
            Arc::clone(&self.context.db),
            Arc::clone(&self.file),
            config.flush_interval,
        )
        .with_flush_on_shutdown(config.flush_on_shutdown)
        .spawn(self.shutdown_tx.subscribe());

        info!(addr = %self.local_addr()?, "listening");

        let result = tokio::select! {
            res = self.accept_loop() => res,
            _ = shutdown => {
                info!("shutting down");
                Ok(())
            }
        };

        if let Err(err) = &result {
            error!(error = %err, "accept loop failed");
        }

        self.context.registry.close_all();
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = writer.await {
            error!(error = %err, "persistence writer panicked");
        }

        result
    }

    /// Runs the server in a background task.
    pub fn spawn(self) -> ServerResult<ServerHandle> {
        let local_addr = self.local_addr()?;
        let db = self.database();
        let registry = self.registry();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(self.run(async move {
            let _ = stop_rx.await;
        }));

        Ok(ServerHandle {
            local_addr,
            db,
            registry,
            stop_tx: Some(stop_tx),
            task,
        })
    }

    /// Accepts connections and spawns one session per socket.
    ///
    /// Per-connection accept errors are logged and skipped; anything else
    /// ends the loop.
    async fn accept_loop(&self) -> ServerResult<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) if is_transient(&err) => {
                    warn!(error = %err, "failed to accept connection");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            self.spawn_session(stream, peer);
        }
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(err) = stream.set_nodelay(true) {
            warn!(peer = %peer, error = %err, "failed to set TCP_NODELAY");
        }
        let session = Session::new(Arc::clone(&self.context), peer);
        tokio::spawn(session.run(stream));
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Handle to a server running in the background.
pub struct ServerHandle {
    local_addr: SocketAddr,
    db: Arc<Database>,
    registry: Arc<SessionRegistry>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<ServerResult<()>>,
}

impl ServerHandle {
    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the shared database.
    pub fn database(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Returns the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Stops the server and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the accept loop error, if any.
    pub async fn shutdown(mut self) -> ServerResult<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| ServerError::Internal(format!("server task failed: {e}")))?
    }
}
