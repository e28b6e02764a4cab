//! Network Module
//!
//! HTTP server and client connection handling.
//!
//! ## Architecture
//! - Single accept loop on a tokio `TcpListener`
//! - One task per connection, bounded by a semaphore
//! - Requests routed through the Engine

mod server;
mod connection;
mod router;

pub use server::Server;
pub use connection::Connection;
pub use router::route;
