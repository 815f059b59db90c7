//! An embeddable HTTP/1.x server.
//!
//! clawhttp hosts request handlers behind path-based routing. It parses
//! HTTP/1.0 and HTTP/1.1 requests, streams request and response bodies with
//! fixed-length or chunked framing, keeps connections alive between
//! exchanges, and turns failures into well-formed error responses.
//!
//! # Features
//!
//! - Streaming request bodies (`Content-Length` or `Transfer-Encoding: chunked`)
//! - Streaming responses whose headers are sent on the first body write
//! - Context paths plus `/pattern/:name` routes with named captures
//! - `Expect: 100-continue` with a per-handler veto
//! - HTML error pages for 4xx/5xx failures
//! - JSON request and response bodies through serde
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use clawhttp::{Handler, HttpError, HttpServer, Request, Response, Router, Routes, ServerConfig};
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl Handler for Greet {
//!     async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
//!         let name = request.param("name").unwrap_or("world").to_string();
//!         response.write_text("text/plain", &format!("Hello, {name}!")).await
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let routes = Routes::new().get("/greet/:name", Greet)?;
//! let router = Router::new().mount("/app", routes);
//! HttpServer::new(ServerConfig::default(), router).start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! See `demos/hello_server.rs` for a more complete server.

pub mod codec;
pub mod parser;
pub mod server;

// Re-export commonly used items for convenience
pub use parser::{Body, Endpoints, Error as ParserError, Headers, HttpVersion, Method, Request};
pub use server::{
    Error as ServerError, Handler, HttpError, HttpServer, Resources, Response, Router, Routes,
    ScopedLog, ServerConfig, StatusCode,
};
