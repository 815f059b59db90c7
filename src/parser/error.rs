//! Error types for the HTTP parser.

use thiserror::Error;

/// Errors that can occur while reading an HTTP request head.
#[derive(Debug, Error)]
pub enum Error {
    /// The HTTP method token contains characters outside the token grammar.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// The request line does not have exactly three space-separated tokens.
    #[error("Bad request line: {0}")]
    MalformedRequestLine(String),

    /// The HTTP version in the request is not 1.0 or 1.1.
    #[error("Unrecognised HTTP version in request line: {0}")]
    UnsupportedVersion(String),

    /// A header line has no colon.
    #[error("No colon in header line: {0}")]
    InvalidHeaderFormat(String),

    /// The stream ended before the blank line that terminates the headers.
    #[error("EOF reached before end of headers")]
    UnexpectedEof,

    /// A request or header line exceeded the line limit.
    #[error("Line exceeds {limit} bytes")]
    LineTooLong { limit: usize, request_line: bool },

    /// `Content-Length` is not a decimal integer.
    #[error("Bad Content-Length value {0}")]
    InvalidContentLength(String),

    /// The `Host` header has an unparseable port.
    #[error("Bad Host header {0}")]
    InvalidHost(String),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
