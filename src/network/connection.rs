//! Connection Handler
//!
//! Handles individual client connections.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::protocol::{
    decode_request, encode_response, DecodeError, Request, Response, MAX_HEAD_SIZE,
};

use super::router::route;

/// Initial read buffer capacity
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// What the next read from the client produced
enum Incoming {
    Request(Request),
    Closed,
    Rejected(DecodeError),
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream to the client
    stream: TcpStream,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    /// Reference to the storage engine
    engine: Arc<Engine>,

    /// Peer address for logging
    peer_addr: String,

    /// Idle timeout while waiting for the next request
    read_timeout: Option<Duration>,

    /// Request body limit
    max_body_size: usize,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, engine: Arc<Engine>, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            engine,
            peer_addr,
            read_timeout: config.read_timeout(),
            max_body_size: config.max_body_size,
        })
    }

    /// Serve requests until the client disconnects or asks to close
    pub async fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let request = match self.read_request().await? {
                Incoming::Request(request) => request,
                Incoming::Closed => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Incoming::Rejected(e) => {
                    tracing::warn!("Rejected request from {}: {}", self.peer_addr, e);
                    let response = Response::error(e.status(), &e.to_string());
                    return self.send_response(&response, false).await;
                }
            };

            tracing::trace!(
                "Received {} {} from {}",
                request.method.as_str(),
                request.target,
                self.peer_addr
            );

            let keep_alive = request.keep_alive();
            let response = if request.is_long_poll() {
                match self.route_watching_peer(&request).await? {
                    Some(response) => response,
                    None => {
                        tracing::debug!(
                            "Client {} left during long-poll on {}",
                            self.peer_addr,
                            request.target
                        );
                        return Ok(());
                    }
                }
            } else {
                // Writes run to completion even if the client goes away
                route(&self.engine, &request).await
            };
            self.send_response(&response, keep_alive).await?;

            if !keep_alive {
                return Ok(());
            }
        }
    }

    /// Read until one full request is buffered
    async fn read_request(&mut self) -> Result<Incoming> {
        loop {
            match decode_request(&mut self.buffer, self.max_body_size) {
                Ok(Some(request)) => return Ok(Incoming::Request(request)),
                Ok(None) => {}
                Err(e) => return Ok(Incoming::Rejected(e)),
            }

            let read = self.stream.read_buf(&mut self.buffer);
            let n = match self.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, read).await {
                    Ok(n) => n,
                    Err(_) => {
                        tracing::debug!("Read timeout for client {}", self.peer_addr);
                        return Ok(Incoming::Closed);
                    }
                },
                None => read.await,
            };

            match n {
                Ok(0) => {
                    if !self.buffer.is_empty() {
                        tracing::debug!(
                            "Client {} closed mid-request ({} bytes buffered)",
                            self.peer_addr,
                            self.buffer.len()
                        );
                    }
                    return Ok(Incoming::Closed);
                }
                Ok(_) => {}
                Err(e) if is_disconnect(&e) => return Ok(Incoming::Closed),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Route a long-poll while watching the socket; `None` if the peer closed
    ///
    /// Dropping the routed future drops its waiter, which deregisters it.
    /// Bytes that arrive meanwhile stay buffered for the next request.
    async fn route_watching_peer(&mut self, request: &Request) -> Result<Option<Response>> {
        let buffer_limit = self.max_body_size.saturating_add(MAX_HEAD_SIZE);
        let routed = route(&self.engine, request);
        tokio::pin!(routed);

        loop {
            tokio::select! {
                response = &mut routed => return Ok(Some(response)),
                read = self.stream.read_buf(&mut self.buffer), if self.buffer.len() < buffer_limit => {
                    match read {
                        Ok(0) => return Ok(None),
                        Ok(_) => {}
                        Err(e) if is_disconnect(&e) => return Ok(None),
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Send a response to the client
    async fn send_response(&mut self, response: &Response, keep_alive: bool) -> Result<()> {
        let bytes = encode_response(response, keep_alive);

        match self.stream.write_all(&bytes).await {
            Ok(()) => Ok(()),
            Err(e) if is_disconnect(&e) => {
                // The client left before reading its answer (e.g. gave up on a long-poll)
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    self.peer_addr,
                    e
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
    )
}
