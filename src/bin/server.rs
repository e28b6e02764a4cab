//! jsonkv Server Binary
//!
//! Starts the HTTP server for jsonkv.

use std::sync::Arc;

use clap::Parser;
use jsonkv::network::Server;
use jsonkv::storage::MemoryStore;
use jsonkv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// jsonkv Server
#[derive(Parser, Debug)]
#[command(name = "jsonkv-server")]
#[command(about = "Per-key JSON document store with merge updates and long-polling")]
#[command(version)]
struct Args {
    /// Data directory (one <key>.json file per document)
    #[arg(short, long, default_value = "./jsonkv_data")]
    data_dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:10001")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,

    /// Long-poll timeout in milliseconds
    #[arg(short = 't', long, default_value = "30000")]
    poll_timeout_ms: u64,

    /// Keep documents in memory only (nothing is written to disk)
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,jsonkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("jsonkv Server v{}", jsonkv::VERSION);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .long_poll_timeout_ms(args.poll_timeout_ms)
        .build();

    // Open engine
    let engine = if args.in_memory {
        tracing::info!("Storage: in-memory");
        Engine::with_store(config.clone(), Arc::new(MemoryStore::new()))
    } else {
        tracing::info!("Data directory: {}", args.data_dir);
        Engine::open(config.clone())
    };
    let engine = match engine {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    // Start server
    let server = match Server::bind(config, engine).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, initiating shutdown...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
