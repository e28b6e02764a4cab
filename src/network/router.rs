//! Request router
//!
//! Turns one request into one response via the engine.

use crate::engine::{Engine, Reply};
use crate::protocol::{Command, Request, Response};

/// Handle a single request
pub async fn route(engine: &Engine, request: &Request) -> Response {
    let command = match Command::from_request(request) {
        Ok(command) => command,
        Err(rejection) => return rejection,
    };

    tracing::trace!(method = request.method.as_str(), key = command.key(), "dispatching");

    match engine.execute(command).await {
        Ok(Reply::Document(document)) => Response::document(&document),
        Ok(Reply::Written) => Response::created(),
        Ok(Reply::TimedOut) => Response::no_content(),
        Err(e) => {
            if !e.is_not_found() {
                tracing::warn!(path = %request.target, error = %e, "request failed");
            }
            Response::from_error(&e)
        }
    }
}
