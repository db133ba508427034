//! Dolphin CLI
//!
//! Command-line tools for Dolphin remoting.
//!
//! # Commands
//!
//! - `serve` - Serve the sample controllers over HTTP
//! - `decode` - Decode a JSON command batch for debugging
//! - `demo` - Run a client against an in-process server

mod commands;

use clap::{Parser, Subcommand};
use dolphin_server::ServerConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Dolphin remoting command-line tools.
#[derive(Parser)]
#[command(name = "dolphin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the sample controllers over HTTP
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Endpoint path
        #[arg(short, long, default_value = dolphin_protocol::DEFAULT_ENDPOINT)]
        endpoint: String,

        /// Maximum long-poll time in milliseconds
        #[arg(long, default_value = "5000")]
        poll_ms: u64,

        /// Disable garbage collection
        #[arg(long)]
        no_gc: bool,

        /// Maximum number of concurrent sessions
        #[arg(long, default_value = "1000")]
        max_sessions: usize,
    },

    /// Decode a JSON command batch
    Decode {
        /// File holding the batch
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a client against an in-process server
    Demo {
        /// Number of increments to send
        #[arg(short, long, default_value = "3")]
        increments: u32,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve {
            addr,
            endpoint,
            poll_ms,
            no_gc,
            max_sessions,
        } => {
            let config = ServerConfig::new(addr)
                .with_endpoint_path(endpoint)
                .with_max_poll_time(Duration::from_millis(poll_ms))
                .with_gc(!no_gc)
                .with_max_sessions(max_sessions);
            commands::serve::run(config)?;
        }
        Commands::Decode { file, format } => {
            commands::decode::run(&file, &format)?;
        }
        Commands::Demo { increments } => {
            commands::demo::run(increments)?;
        }
        Commands::Version => {
            println!("Dolphin CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
