//! replidb CLI
//!
//! Command-line tools for replidb databases.
//!
//! # Commands
//!
//! - `inspect` - Display collections, replica ids and sync cursors
//! - `sync` - Run one replication operation against a gate

mod commands;

use clap::{Parser, Subcommand};
use commands::sync::{SyncMode, SyncOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// replidb command-line database tools.
#[derive(Parser)]
#[command(name = "replidb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display database statistics and replication state
    Inspect {
        /// Show per-collection details
        #[arg(short, long)]
        collections: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replicate a collection with a gate
    Sync {
        /// Gate base URL
        #[arg(short, long)]
        url: String,

        /// Collection to replicate
        #[arg(short, long)]
        collection: String,

        /// Operation to run
        #[arg(short, long, value_enum, default_value = "merge")]
        mode: SyncMode,

        /// User for basic authentication
        #[arg(long)]
        user: Option<String>,

        /// Password for basic authentication
        #[arg(long)]
        password: Option<String>,

        /// Conflict policy for merges (remote-wins, last-write-wins)
        #[arg(long, default_value = "remote-wins")]
        policy: String,

        /// Send CBOR instead of JSON
        #[arg(long)]
        cbor: bool,

        /// First document of a reset
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Page size of reset-local; window of reset-remote (default: whole collection)
        #[arg(long)]
        size: Option<usize>,

        /// Milliseconds to wait for the remote lock
        #[arg(long, default_value = "1000")]
        lock_wait_ms: u64,

        /// Proxy URL
        #[arg(long)]
        proxy: Option<String>,

        /// Accept any server certificate
        #[arg(long)]
        trust_all_certs: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            collections,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, collections, &format)?;
        }
        Commands::Sync {
            url,
            collection,
            mode,
            user,
            password,
            policy,
            cbor,
            offset,
            size,
            lock_wait_ms,
            proxy,
            trust_all_certs,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for sync")?;
            let options = SyncOptions {
                url,
                collection,
                mode,
                user,
                password,
                policy,
                cbor,
                offset,
                size,
                lock_wait: Duration::from_millis(lock_wait_ms),
                proxy,
                trust_all_certs,
            };
            commands::sync::run(&path, &options, &format)?;
        }
        Commands::Version => {
            println!("replidb CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("replidb Core v{}", replidb_core::VERSION);
        }
    }

    Ok(())
}
