//! KVLite - An In-Memory Key-Value Store with Pub/Sub
//!
//! This is the main entry point for the KVLite server.
//! It loads the snapshot, sets up the TCP listener, and serves clients
//! until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use kvlite::{Config, PubSubRegistry, Server, StorageEngine};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    let persistence = match config.snapshot_path() {
        Some(path) => format!("snapshot {}", path.display()),
        None => "in-memory only".to_string(),
    };

    println!(
        r#"
KVLite v{} - In-Memory Key-Value Store with Pub/Sub
──────────────────────────────────────────────────────────────
Server started on {} ({})
Ready to accept connections.

Try it:  nc {} {}
         SET name Ariz
         GET name
         SUBSCRIBE news

Use Ctrl+C to shutdown gracefully.
"#,
        kvlite::VERSION,
        config.bind_address(),
        persistence,
        config.host,
        config.port
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Load the snapshot; a corrupt file is fatal, a missing one is not
    let storage = Arc::new(
        StorageEngine::open(&config).context("failed to load snapshot, refusing to start")?,
    );
    info!(keys = storage.len(), "Storage engine initialized");

    let registry = Arc::new(PubSubRegistry::new());

    // Bind the TCP listener
    let server = Server::bind(&config, Arc::clone(&storage), Arc::clone(&registry))
        .await
        .with_context(|| format!("failed to listen on {}", config.bind_address()))?;
    let stats = server.stats();

    print_banner(&config);

    server.run_until_ctrl_c().await;

    let storage_stats = storage.stats();
    let pubsub_stats = registry.stats();
    info!(
        connections = stats
            .connections_accepted
            .load(std::sync::atomic::Ordering::Relaxed),
        keys = storage_stats.keys,
        snapshot_failures = storage_stats.snapshot_failures,
        published = pubsub_stats.published,
        dropped = pubsub_stats.dropped,
        "Server shutdown complete"
    );
    Ok(())
}
