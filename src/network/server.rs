//! HTTP Server
//!
//! Accepts connections and spawns one task per client.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KvError, Result};

use super::connection::Connection;

/// HTTP server for jsonkv
pub struct Server {
    /// Server configuration
    config: Config,

    /// Shared storage engine
    engine: Arc<Engine>,

    /// Bound listener
    listener: TcpListener,

    /// One permit per open connection
    connections: Arc<Semaphore>,
}

impl Server {
    /// Bind the listen address from `config`
    pub async fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr).await.map_err(|e| {
            KvError::Network(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;
        let connections = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            engine,
            listener,
            connections,
        })
    }

    /// The address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    ///
    /// Stops accepting new connections; connections already open finish on
    /// their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!("Listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.connections).acquire_owned() => permit
                    .map_err(|e| KvError::Network(format!("connection limiter closed: {e}")))?,
            };

            let (stream, addr) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        // Transient (e.g. out of file descriptors); keep serving
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                },
            };

            let engine = Arc::clone(&self.engine);
            let mut connection = match Connection::new(stream, engine, &self.config) {
                Ok(connection) => connection,
                Err(e) => {
                    tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                    continue;
                }
            };

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = connection.handle().await {
                    tracing::warn!("Connection error ({}): {}", connection.peer_addr(), e);
                }
            });
        }

        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Get the shared engine
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }
}
