//! HTTP server implementation for clawhttp.
//!
//! This module holds everything above the parser: the status catalog, the
//! handler contract and its error type, the streaming [`Response`], routing,
//! the per-connection request loop, and the listener that spawns one task per
//! accepted connection.

mod config;
mod connection;
mod error;
mod error_page;
mod handler;
mod http_server;
mod logger;
mod resources;
mod response;
mod router;
mod status;
mod tests;

// Re-export public items
pub use config::ServerConfig;
pub use connection::Connection;
pub use error::{BoxError, Error, HttpError};
pub use handler::{Handler, NotFoundHandler};
pub use http_server::HttpServer;
pub use logger::{ConnectionLog, ExchangeLog, ScopedLog};
pub use resources::Resources;
pub use response::{Response, ResponseSink, TextWriter};
pub use router::{Pattern, PatternError, Resolved, Router, Routes};
pub use status::StatusCode;
