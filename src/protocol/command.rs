//! Command definitions
//!
//! Maps HTTP requests onto engine operations and back.

use bytes::Bytes;

use crate::error::Result;
use crate::merge::Document;

use super::codec::{percent_decode, percent_encode};
use super::{Method, Request, Response, Status};

/// A parsed command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read a document (`GET /{key}`)
    Fetch { key: String },

    /// Read a document, or wait for it to be written (`GET /{key}?poll`)
    Poll { key: String },

    /// Wait for the next write (`GET /{key}?next`)
    Watch { key: String },

    /// Replace a document wholesale (`PUT /{key}`)
    Replace { key: String, document: Document },

    /// Overwrite top-level fields (`POST /{key}`)
    Assign { key: String, partial: Document },

    /// Recursive merge (`PATCH /{key}`)
    Patch { key: String, partial: Document },
}

impl Command {
    /// The key this command targets
    pub fn key(&self) -> &str {
        match self {
            Command::Fetch { key }
            | Command::Poll { key }
            | Command::Watch { key }
            | Command::Replace { key, .. }
            | Command::Assign { key, .. }
            | Command::Patch { key, .. } => key,
        }
    }

    /// Interpret a request, or produce the error response to send instead
    pub fn from_request(request: &Request) -> std::result::Result<Command, Response> {
        let raw_key = request.path().strip_prefix('/').unwrap_or_default();
        if raw_key.is_empty() {
            return Err(Response::error(Status::NotFound, "no key in request path"));
        }
        let key = percent_decode(raw_key)
            .ok_or_else(|| Response::error(Status::BadRequest, "malformed percent-encoding in key"))?;

        match request.method {
            Method::Get if request.has_query_flag("poll") => Ok(Command::Poll { key }),
            Method::Get if request.has_query_flag("next") => Ok(Command::Watch { key }),
            Method::Get => Ok(Command::Fetch { key }),
            Method::Put => {
                let document = parse_body(&request.body)?;
                Ok(Command::Replace { key, document })
            }
            Method::Post => {
                let partial = parse_object_body(&request.body)?;
                Ok(Command::Assign { key, partial })
            }
            Method::Patch => {
                let partial = parse_object_body(&request.body)?;
                Ok(Command::Patch { key, partial })
            }
            Method::Other(ref method) => Err(Response::error(
                Status::MethodNotAllowed,
                &format!("method {method} is not supported"),
            )),
        }
    }

    /// Build the request a client sends for this command
    pub fn to_request(&self) -> Result<Request> {
        let path = format!("/{}", percent_encode(self.key()));

        let request = match self {
            Command::Fetch { .. } => Request::new(Method::Get, path, Bytes::new()),
            Command::Poll { .. } => Request::new(Method::Get, format!("{path}?poll"), Bytes::new()),
            Command::Watch { .. } => Request::new(Method::Get, format!("{path}?next"), Bytes::new()),
            Command::Replace { document, .. } => json_request(Method::Put, path, document)?,
            Command::Assign { partial, .. } => json_request(Method::Post, path, partial)?,
            Command::Patch { partial, .. } => json_request(Method::Patch, path, partial)?,
        };

        Ok(request)
    }
}

fn json_request(method: Method, path: String, document: &Document) -> Result<Request> {
    let body = Bytes::from(serde_json::to_vec(document)?);
    Ok(Request::new(method, path, body).with_header("Content-Type", "application/json"))
}

fn parse_body(body: &[u8]) -> std::result::Result<Document, Response> {
    serde_json::from_slice(body).map_err(|e| {
        Response::error(Status::BadRequest, &format!("body is not valid JSON: {e}"))
    })
}

fn parse_object_body(body: &[u8]) -> std::result::Result<Document, Response> {
    let document = parse_body(body)?;
    if !document.is_object() {
        return Err(Response::error(
            Status::BadRequest,
            "body must be a JSON object",
        ));
    }
    Ok(document)
}
