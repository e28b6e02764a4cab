//! Client Module
//!
//! Async client speaking the server's HTTP subset over one keep-alive
//! connection. Used by `jsonkv-cli` and the end-to-end tests.

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{KvError, Result};
use crate::merge::Document;
use crate::protocol::{decode_response, encode_request, Command, Response, Status};

/// A connection to a jsonkv server
pub struct Client {
    stream: TcpStream,
    buffer: BytesMut,
    host: String,
}

impl Client {
    /// Connect to `addr` (host:port)
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| KvError::Network(format!("failed to connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream,
            buffer: BytesMut::with_capacity(8 * 1024),
            host: addr.to_string(),
        })
    }

    /// Fetch a document
    pub async fn get(&mut self, key: &str) -> Result<Document> {
        let response = self.send(&Command::Fetch { key: key.to_string() }).await?;
        expect_document(key, response)
    }

    /// Replace a document wholesale
    pub async fn put(&mut self, key: &str, document: Document) -> Result<()> {
        let command = Command::Replace {
            key: key.to_string(),
            document,
        };
        let response = self.send(&command).await?;
        expect_written(key, response)
    }

    /// Overwrite top-level fields of an existing document
    pub async fn assign(&mut self, key: &str, partial: Document) -> Result<()> {
        let command = Command::Assign {
            key: key.to_string(),
            partial,
        };
        let response = self.send(&command).await?;
        expect_written(key, response)
    }

    /// Deep-merge into an existing document
    pub async fn patch(&mut self, key: &str, partial: Document) -> Result<()> {
        let command = Command::Patch {
            key: key.to_string(),
            partial,
        };
        let response = self.send(&command).await?;
        expect_written(key, response)
    }

    /// Fetch, or wait for the document to be written; `None` on timeout
    pub async fn poll(&mut self, key: &str) -> Result<Option<Document>> {
        let response = self.send(&Command::Poll { key: key.to_string() }).await?;
        expect_long_poll(key, response)
    }

    /// Wait for the next write; `None` on timeout
    pub async fn watch(&mut self, key: &str) -> Result<Option<Document>> {
        let response = self.send(&Command::Watch { key: key.to_string() }).await?;
        expect_long_poll(key, response)
    }

    /// Send one command and read its response
    pub async fn send(&mut self, command: &Command) -> Result<Response> {
        let request = command.to_request()?.with_header("Host", self.host.as_str());
        self.stream.write_all(&encode_request(&request)).await?;

        loop {
            if let Some(response) = decode_response(&mut self.buffer)? {
                return Ok(response);
            }
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(KvError::Network(
                    "server closed the connection mid-response".to_string(),
                ));
            }
        }
    }
}

fn expect_document(key: &str, response: Response) -> Result<Document> {
    match response.status {
        Status::Ok => Ok(serde_json::from_slice(&response.body)?),
        _ => Err(unexpected(key, response)),
    }
}

fn expect_written(key: &str, response: Response) -> Result<()> {
    match response.status {
        Status::Created => Ok(()),
        _ => Err(unexpected(key, response)),
    }
}

fn expect_long_poll(key: &str, response: Response) -> Result<Option<Document>> {
    match response.status {
        Status::NoContent => Ok(None),
        _ => expect_document(key, response).map(Some),
    }
}

/// Translate an error response back into a KvError
fn unexpected(key: &str, response: Response) -> KvError {
    let message = response
        .error_message()
        .unwrap_or_else(|| response.status.reason().to_string());

    match response.status {
        Status::NotFound => KvError::not_found(key),
        Status::InternalError => KvError::StoreFailure(message),
        status => KvError::Protocol(format!("{} {}: {}", status.code(), status.reason(), message)),
    }
}
