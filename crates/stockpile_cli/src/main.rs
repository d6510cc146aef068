//! Stockpile CLI
//!
//! Server daemon and entry file tools.
//!
//! # Commands
//!
//! - `serve` - Run the replication server until Ctrl-C
//! - `inspect` - List the entries in an entry file
//! - `verify` - Report unparseable lines in an entry file
//! - `watch` - Connect as a client and print every update

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use stockpile_protocol::{DEFAULT_DB_FILENAME, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

/// Stockpile inventory server and tools.
#[derive(Parser)]
#[command(name = "stockpile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the entry file
    #[arg(global = true, short, long, default_value = DEFAULT_DB_FILENAME)]
    path: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the replication server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
        bind: SocketAddr,

        /// Seconds between dirty checks of the persistence writer
        #[arg(long, default_value_t = 900)]
        flush_interval: u64,

        /// Disconnect peers whose outbound queue exceeds this many lines
        #[arg(long)]
        queue_capacity: Option<usize>,

        /// Skip the final flush on shutdown
        #[arg(long)]
        no_final_flush: bool,
    },

    /// List the entries in the entry file
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Check every line of the entry file
    Verify,

    /// Connect to a server and print the snapshot and every update
    Watch {
        /// Server host
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Server port
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Print wire lines instead of decoded commands
        #[arg(long)]
        raw: bool,
    },

    /// Show version information
    Version,
}

/// Output format for `inspect`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable listing
    Text,
    /// Pretty-printed JSON
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            bind,
            flush_interval,
            queue_capacity,
            no_final_flush,
        } => {
            let options = commands::serve::ServeOptions {
                bind,
                path: cli.path,
                flush_interval: std::time::Duration::from_secs(flush_interval),
                queue_capacity,
                final_flush: !no_final_flush,
            };
            commands::serve::run(options)?;
        }
        Commands::Inspect { format } => {
            commands::inspect::run(&cli.path, format)?;
        }
        Commands::Verify => {
            commands::verify::run(&cli.path)?;
        }
        Commands::Watch { host, port, raw } => {
            commands::watch::run(host, port, raw)?;
        }
        Commands::Version => {
            println!("Stockpile CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Stockpile Core v{}", stockpile_core::VERSION);
        }
    }

    Ok(())
}
