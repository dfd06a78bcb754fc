//! TCP Server
//!
//! Accepts connections and spawns one [`handle_connection`] task per
//! client. The storage engine and the pub/sub registry are created by the
//! caller and shared by every connection.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::pubsub::PubSubRegistry;
use crate::storage::StorageEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// A bound listener plus the state every connection shares.
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
    queue_capacity: usize,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds to `config.bind_address()`.
    pub async fn bind(
        config: &Config,
        storage: Arc<StorageEngine>,
        registry: Arc<PubSubRegistry>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        Ok(Self::new(listener, storage, registry, config.queue_capacity))
    }

    /// Wraps an already bound listener.
    pub fn new(
        listener: TcpListener,
        storage: Arc<StorageEngine>,
        registry: Arc<PubSubRegistry>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            listener,
            handler: CommandHandler::new(storage, registry),
            queue_capacity,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        if let Ok(addr) = self.local_addr() {
            info!("Listening on {}", addr);
        }

        tokio::select! {
            _ = accept_loop(&self) => {}
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    /// Accepts connections until Ctrl+C.
    pub async fn run_until_ctrl_c(self) {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

/// Main loop that accepts incoming connections
async fn accept_loop(server: &Server) {
    loop {
        match server.listener.accept().await {
            Ok((stream, addr)) => {
                let handler = server.handler.clone();
                let stats = Arc::clone(&server.stats);
                let capacity = server.queue_capacity;

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, capacity, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
