//! Protocol Module
//!
//! The HTTP/1.1 subset spoken between clients and the server.
//!
//! ## Routes
//! ```text
//! GET    /{key}          fetch               200 | 404
//! GET    /{key}?poll     fetch or long-poll  200 | 204 (timed out)
//! GET    /{key}?next     wait for next write 200 | 204 (timed out)
//! PUT    /{key}          replace (any JSON)  201 | 400 | 500
//! POST   /{key}          replace fields      201 | 400 | 404 | 500
//! PATCH  /{key}          recursive merge     201 | 400 | 404 | 500
//! ```
//!
//! `poll` and `next` only count as bare flags; `?poll=false` is a plain fetch.
//!
//! ### Message Framing
//! - Request and response bodies are delimited by `Content-Length` only;
//!   chunked request bodies are answered with 411
//! - Connections are kept alive unless the peer sends `Connection: close`
//!   or speaks HTTP/1.0
//! - Error bodies are `{"error": "<message>"}`

mod command;
mod request;
mod response;
mod codec;

pub use command::Command;
pub use request::{Method, Request};
pub use response::{Response, Status};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, percent_decode,
    percent_encode, DecodeError, MAX_HEAD_SIZE,
};
