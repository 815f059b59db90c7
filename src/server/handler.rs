//! Request handlers.

use async_trait::async_trait;

use crate::parser::Request;
use crate::server::error::HttpError;
use crate::server::response::Response;

/// Serves the requests routed to it.
///
/// A handler populates `response` and returns `Ok(())`; the connection closes
/// the response body afterwards if the handler did not. Returning an
/// [`HttpError`] before anything was written sends an error page with its
/// status instead.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError>;

    /// Asked before the body is delivered when the client sent
    /// `Expect: 100-continue`. Returning `false` answers 417.
    fn should_continue(&self, _request: &Request<'_>) -> bool {
        true
    }

    /// Called once when the server shuts down.
    fn shutdown(&self) {}
}

/// Answers every request with 404. Mounted at `/` when nothing else is.
#[derive(Debug, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl Handler for NotFoundHandler {
    async fn handle(&self, request: &mut Request<'_>, _response: &mut Response<'_>) -> Result<(), HttpError> {
        Err(HttpError::not_found(format!("No handler for {}", request.path())))
    }
}
