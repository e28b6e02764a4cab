//! Request definitions
//!
//! Represents HTTP requests from clients.

use bytes::Bytes;

/// Request methods the server distinguishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,

    /// Anything else; answered with 405
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "POST" => Method::Post,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Other(token) => token,
        }
    }
}

/// A parsed request
#[derive(Debug, Clone)]
pub struct Request {
    /// Request method
    pub method: Method,

    /// Raw request target (path plus optional query)
    pub target: String,

    /// Minor HTTP version (0 or 1)
    pub minor_version: u8,

    /// Header fields in arrival order, names as sent
    pub headers: Vec<(String, String)>,

    /// Body (empty when no Content-Length was sent)
    pub body: Bytes,
}

impl Request {
    /// Create an HTTP/1.1 request with no headers
    pub fn new(method: Method, target: impl Into<String>, body: Bytes) -> Self {
        Self {
            method,
            target: target.into(),
            minor_version: 1,
            headers: Vec::new(),
            body,
        }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Path component of the target
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.target)
    }

    /// Query component of the target, without the '?'
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// True if the query carries `flag` bare; `flag=...` does not count
    pub fn has_query_flag(&self, flag: &str) -> bool {
        self.query()
            .is_some_and(|query| query.split('&').any(|pair| pair == flag))
    }

    /// `GET` with a `poll` or `next` flag
    pub fn is_long_poll(&self) -> bool {
        self.method == Method::Get && (self.has_query_flag("poll") || self.has_query_flag("next"))
    }

    /// Whether the connection stays open after this request
    pub fn keep_alive(&self) -> bool {
        let connection = self.header("connection").map(str::to_ascii_lowercase);
        match (self.minor_version, connection.as_deref()) {
            (_, Some("close")) => false,
            (0, Some("keep-alive")) => true,
            (0, _) => false,
            _ => true,
        }
    }
}
