//! ChunkMap Server Binary
//!
//! Serves a chunk map over TCP until `quit` or `exit` is typed on stdin.

use std::io::BufRead;
use std::sync::Arc;

use chunkmap::network::Server;
use chunkmap::{Config, WorldMap};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// ChunkMap Server
#[derive(Parser, Debug)]
#[command(name = "chunkmap-server")]
#[command(about = "Remote chunk and column storage for world servers")]
#[command(version)]
struct Args {
    /// Journal file, or a directory to hold cubes.dim0.db
    storage: String,

    /// TCP port to listen on
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Grace period between shutdown signal and closing connections (ms)
    #[arg(long, default_value = "1000")]
    grace_ms: u64,

    /// Shut down idle connections on exit instead of waiting for their peers
    #[arg(long)]
    force_close: bool,

    /// Skip journal compaction on startup
    #[arg(long)]
    no_compact: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,chunkmap=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("ChunkMap Server v{}", chunkmap::VERSION);
    tracing::info!("Storage: {}", args.storage);

    let config = Config::builder()
        .storage_path(&args.storage)
        .listen_addr(format!("{}:{}", args.host, args.port))
        .shutdown_grace_ms(args.grace_ms)
        .force_close_on_shutdown(args.force_close)
        .compact_on_open(!args.no_compact)
        .build();

    let map = match WorldMap::open(&config) {
        Ok(map) => Arc::new(map),
        Err(e) => {
            tracing::error!("Failed to open map: {}", e);
            std::process::exit(1);
        }
    };

    let mut server = Server::new(config, Arc::clone(&map));
    if let Err(e) = server.start() {
        tracing::error!("Failed to start server: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Type 'quit' or 'exit' to stop");
    wait_for_quit();

    server.stop();
    if let Err(e) = map.shutdown() {
        tracing::error!("Failed to close map: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Block until a quit command or end of stdin
fn wait_for_quit() {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) if is_quit_command(line.trim()) => return,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Console read failed: {}", e);
                return;
            }
        }
    }
}

fn is_quit_command(line: &str) -> bool {
    matches!(line, "quit" | "Quit" | "exit" | "Exit")
}
