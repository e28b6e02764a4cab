//! Response definitions
//!
//! Represents responses to clients.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::KvError;
use crate::merge::Document;

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    Ok = 200,
    Created = 201,
    NoContent = 204,
    BadRequest = 400,
    NotFound = 404,
    MethodNotAllowed = 405,
    LengthRequired = 411,
    PayloadTooLarge = 413,
    InternalError = 500,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Created => "Created",
            Status::NoContent => "No Content",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::LengthRequired => "Length Required",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::InternalError => "Internal Server Error",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        let status = match code {
            200 => Status::Ok,
            201 => Status::Created,
            204 => Status::NoContent,
            400 => Status::BadRequest,
            404 => Status::NotFound,
            405 => Status::MethodNotAllowed,
            411 => Status::LengthRequired,
            413 => Status::PayloadTooLarge,
            500 => Status::InternalError,
            _ => return None,
        };
        Some(status)
    }
}

/// JSON body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// A response to send to client
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Body (document for 200, error message for 4xx/5xx, empty otherwise)
    pub body: Bytes,
}

impl Response {
    /// 200 with a JSON document
    pub fn document(document: &Document) -> Self {
        match serde_json::to_vec(document) {
            Ok(body) => Self {
                status: Status::Ok,
                body: Bytes::from(body),
            },
            Err(e) => Self::error(Status::InternalError, &e.to_string()),
        }
    }

    /// 201 with no body
    pub fn created() -> Self {
        Self {
            status: Status::Created,
            body: Bytes::new(),
        }
    }

    /// 204 with no body
    pub fn no_content() -> Self {
        Self {
            status: Status::NoContent,
            body: Bytes::new(),
        }
    }

    /// An error status with a `{"error": ...}` body
    pub fn error(status: Status, message: &str) -> Self {
        let body = ErrorBody {
            error: message.to_string(),
        };
        Self {
            status,
            body: serde_json::to_vec(&body).map(Bytes::from).unwrap_or_default(),
        }
    }

    /// Map an engine error onto a status
    pub fn from_error(err: &KvError) -> Self {
        let status = match err {
            KvError::NotFound { .. } => Status::NotFound,
            KvError::InvalidKey(_) | KvError::Protocol(_) => Status::BadRequest,
            _ => Status::InternalError,
        };
        Self::error(status, &err.to_string())
    }

    /// The message of an error body, if this is one
    pub fn error_message(&self) -> Option<String> {
        serde_json::from_slice::<ErrorBody>(&self.body)
            .ok()
            .map(|body| body.error)
    }
}
