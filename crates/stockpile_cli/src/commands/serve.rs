//! Serve command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use stockpile_server::{Server, ServerConfig};
use tracing::{error, info};

/// Options for `serve`, already mapped from flags.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Entry file path.
    pub path: PathBuf,
    /// Persistence writer period.
    pub flush_interval: Duration,
    /// Optional outbound queue bound.
    pub queue_capacity: Option<usize>,
    /// Whether to flush once more on shutdown.
    pub final_flush: bool,
}

impl ServeOptions {
    /// Builds the server configuration.
    pub fn to_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(self.bind)
            .with_db_path(&self.path)
            .with_flush_interval(self.flush_interval)
            .with_flush_on_shutdown(self.final_flush);
        if let Some(capacity) = self.queue_capacity {
            config = config.with_outbound_queue_capacity(capacity);
        }
        config
    }
}

/// Runs the server until Ctrl-C.
///
/// Startup failures (entry file, lock, bind) are returned so the process
/// exits nonzero.
pub fn run(options: ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(options.to_config()))
}

async fn serve(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, "failed to start server");
            return Err(err.into());
        }
    };

    server
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    info!("server stopped");
    Ok(())
}
