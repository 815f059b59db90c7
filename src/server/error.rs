//! Error types for the HTTP server.

use std::net::SocketAddr;

use thiserror::Error;

use crate::codec::Error as CodecError;
use crate::parser::Error as ParserError;
use crate::server::status::StatusCode;

/// A boxed error usable as the cause of an [`HttpError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that stop the server itself (as opposed to a single exchange).
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A failure that should be answered with a specific HTTP status.
///
/// Handlers return this to reject a request (404, 405, 417...). Anything else
/// that goes wrong is converted into a 500 carrying the original message, with
/// the original error kept as the cause. The connection turns it into an
/// error page as long as the response headers have not been sent yet.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    reason: Option<String>,
    message: String,
    headers: Vec<(String, String)>,
    #[source]
    cause: Option<BoxError>,
}

impl HttpError {
    /// Create an error with the given status code and descriptive message.
    pub fn new(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            reason: None,
            message: message.into(),
            headers: Vec::new(),
            cause: None,
        }
    }

    /// Wrap an arbitrary failure as `500 Internal Server Error`.
    pub fn internal(cause: impl Into<BoxError>) -> Self {
        let cause = cause.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            reason: None,
            message: cause.to_string(),
            headers: Vec::new(),
            cause: Some(cause),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    /// Override the reason phrase sent on the status line.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Add a header to the error response, e.g. `Allow` on a 405.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach the underlying failure.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The explicit reason phrase, or the standard one for the status.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Routine failures (404, 405) are answered normally and not logged as errors.
    pub fn is_routine(&self) -> bool {
        self.status == StatusCode::NOT_FOUND || self.status == StatusCode::METHOD_NOT_ALLOWED
    }
}

impl From<ParserError> for HttpError {
    fn from(err: ParserError) -> Self {
        if let ParserError::Io(_) = err {
            return HttpError::internal(err);
        }
        let status = match &err {
            ParserError::UnsupportedVersion(_) => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ParserError::LineTooLong { request_line: true, .. } => StatusCode::URI_TOO_LONG,
            _ => StatusCode::BAD_REQUEST,
        };
        HttpError::new(status, err.to_string())
    }
}

impl From<CodecError> for HttpError {
    fn from(err: CodecError) -> Self {
        if err.is_protocol_error() {
            HttpError::bad_request(err.to_string())
        } else {
            HttpError::internal(err)
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::internal(err)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::internal(err)
    }
}
