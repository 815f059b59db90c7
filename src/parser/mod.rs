//! HTTP request parser module.
//!
//! Reads the request head (request line and headers) off a buffered async
//! stream and builds the per-exchange [`Request`]. The request body is not
//! read up front: [`Body`] pulls it through the chunked or length-bound codec
//! as the handler asks for it.

mod body;
mod error;
mod headers;
mod line;
mod method;
mod request;
mod version;

// Re-export public items
pub use body::{Body, BodySource};
pub use error::Error;
pub use headers::Headers;
pub use line::{parse_request_line, read_headers, read_line, RequestLine, MAX_LINE_LENGTH};
pub use method::Method;
pub use request::{Endpoints, Request, DEFAULT_ENCODING};
pub use version::HttpVersion;

pub(crate) use request::read_request;
