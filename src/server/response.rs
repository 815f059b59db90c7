//! HTTP response with a streaming body.
//!
//! A [`Response`] starts out mutable: status, reason phrase and headers can be
//! changed freely. The first body write (or [`Response::close`]) finalizes it:
//! the framing is chosen from the headers, the status line and headers are
//! written to the connection, and from then on only body bytes may follow.

use std::io::ErrorKind;
use std::path::Path;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{ChunkedEncoder, LengthBound};
use crate::parser::Headers;
use crate::server::error::HttpError;
use crate::server::resources::Resources;
use crate::server::status::StatusCode;

/// The connection's buffered write half, type-erased.
pub type ResponseSink<'w> = dyn AsyncWrite + Unpin + Send + Sync + 'w;

const STREAM_BUFFER_SIZE: usize = 1024;

enum BodySink {
    Chunked(ChunkedEncoder),
    Fixed(LengthBound),
}

enum BodyState {
    /// Headers are still mutable.
    Unopened,
    /// Headers are on the wire; body bytes go through the sink.
    Open(BodySink),
    Closed,
}

/// An HTTP/1.1 response being written to a connection.
pub struct Response<'w> {
    status: StatusCode,
    reason: Option<String>,
    headers: Headers,
    server: Option<String>,
    state: BodyState,
    writer_opened: bool,
    sink: &'w mut ResponseSink<'w>,
}

impl<'w> Response<'w> {
    pub(crate) fn new(sink: &'w mut ResponseSink<'w>, server: Option<String>) -> Self {
        let mut response = Self {
            status: StatusCode::OK,
            reason: None,
            headers: Headers::new(),
            server,
            state: BodyState::Unopened,
            writer_opened: false,
            sink,
        };
        response.reset();
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: impl Into<StatusCode>) -> Result<(), HttpError> {
        self.check_mutable()?;
        self.status = status.into();
        Ok(())
    }

    /// The reason phrase that will be sent on the status line.
    pub fn reason(&self) -> &str {
        self.reason
            .as_deref()
            .unwrap_or_else(|| self.status.reason_phrase())
    }

    /// Override the standard reason phrase.
    pub fn set_reason(&mut self, reason: impl Into<String>) -> Result<(), HttpError> {
        self.check_mutable()?;
        self.reason = Some(reason.into());
        Ok(())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the headers; fails once they have been sent.
    pub fn headers_mut(&mut self) -> Result<&mut Headers, HttpError> {
        self.check_mutable()?;
        Ok(&mut self.headers)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), HttpError> {
        self.headers_mut()?.set(name, value);
        Ok(())
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<(), HttpError> {
        self.headers_mut()?.add(name, value);
        Ok(())
    }

    /// Whether the status line and headers have been written.
    pub fn is_committed(&self) -> bool {
        !matches!(self.state, BodyState::Unopened)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, BodyState::Closed)
    }

    /// Finalize the headers and open the body.
    ///
    /// Statuses without a body (1xx, 204, 304) get no body framing. Otherwise
    /// framing is picked from the headers: `Transfer-Encoding: chunked` first,
    /// then `Content-Length`, otherwise chunked is used and the header is set.
    /// Calling this on an open response does nothing.
    pub async fn open(&mut self) -> Result<(), HttpError> {
        match self.state {
            BodyState::Unopened => {}
            BodyState::Open(_) => return Ok(()),
            BodyState::Closed => return Err(HttpError::internal("Response is already closed")),
        }

        let sink = self.select_sink()?;
        let head = format!(
            "HTTP/1.1 {} {}\r\n{}\r\n",
            self.status,
            self.reason(),
            self.headers
        );
        self.state = BodyState::Open(sink);
        self.sink.write_all(head.as_bytes()).await?;
        Ok(())
    }

    fn select_sink(&mut self) -> Result<BodySink, HttpError> {
        if !self.status.allows_body() {
            self.headers.remove_ignore_case("Transfer-Encoding");
            return Ok(BodySink::Fixed(LengthBound::writer(0)));
        }

        let chunked = self
            .headers
            .get_first_ignore_case("Transfer-Encoding")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"));
        if chunked {
            return Ok(BodySink::Chunked(ChunkedEncoder::new()));
        }

        if let Some(value) = self.headers.get_first_ignore_case("Content-Length") {
            let length = value.trim().parse::<u64>().map_err(|_| {
                HttpError::internal(format!("Invalid response Content-Length {value:?}"))
            })?;
            return Ok(BodySink::Fixed(LengthBound::writer(length)));
        }

        self.headers.set("Transfer-Encoding", "chunked");
        Ok(BodySink::Chunked(ChunkedEncoder::new()))
    }

    /// Write body bytes, finalizing the headers first if needed.
    pub async fn write(&mut self, data: &[u8]) -> Result<(), HttpError> {
        if data.is_empty() {
            return Ok(());
        }
        self.open().await?;

        match &mut self.state {
            BodyState::Open(BodySink::Chunked(encoder)) => encoder.write(&mut *self.sink, data).await?,
            BodyState::Open(BodySink::Fixed(bound)) => bound.write(&mut *self.sink, data).await?,
            _ => return Err(HttpError::internal("Response is already closed")),
        }
        Ok(())
    }

    /// Push buffered body bytes to the client.
    pub async fn flush(&mut self) -> Result<(), HttpError> {
        if let BodyState::Open(BodySink::Chunked(encoder)) = &mut self.state {
            encoder.flush(&mut *self.sink).await?;
        }
        self.sink.flush().await?;
        Ok(())
    }

    /// Finish the body and flush. Closing an already closed response is a no-op.
    ///
    /// A response that never wrote a body and declared no framing is sent with
    /// `Content-Length: 0`.
    pub async fn close(&mut self) -> Result<(), HttpError> {
        if self.is_closed() {
            return Ok(());
        }

        if !self.is_committed()
            && self.status.allows_body()
            && !self.headers.contains_ignore_case("Transfer-Encoding")
            && !self.headers.contains_ignore_case("Content-Length")
        {
            self.headers.set("Content-Length", "0");
        }
        self.open().await?;

        let state = std::mem::replace(&mut self.state, BodyState::Closed);
        match state {
            BodyState::Open(BodySink::Chunked(mut encoder)) => encoder.close(&mut *self.sink).await?,
            BodyState::Open(BodySink::Fixed(bound)) => {
                bound.finish_write()?;
                self.sink.flush().await?;
            }
            BodyState::Unopened | BodyState::Closed => {}
        }
        Ok(())
    }

    /// Open a UTF-8 text body of the given media type.
    ///
    /// Fails if a writer was already opened or body bytes were already written.
    pub fn open_writer(&mut self, content_type: &str) -> Result<TextWriter<'_, 'w>, HttpError> {
        if self.writer_opened || self.is_committed() {
            return Err(HttpError::internal("Response body was already opened"));
        }
        self.set_header("Content-Type", format!("{content_type}; charset=utf-8"))?;
        self.writer_opened = true;
        Ok(TextWriter { response: self })
    }

    /// Send `text` as the whole body.
    pub async fn write_text(&mut self, content_type: &str, text: &str) -> Result<(), HttpError> {
        let mut writer = self.open_writer(content_type)?;
        writer.write(text).await?;
        writer.close().await
    }

    /// Send `bytes` as the whole body with a matching `Content-Length`.
    pub async fn write_bytes(&mut self, content_type: &str, bytes: &[u8]) -> Result<(), HttpError> {
        self.set_header("Content-Type", content_type)?;
        self.set_header("Content-Length", bytes.len().to_string())?;
        self.write(bytes).await?;
        self.close().await
    }

    /// Serialize `value` as an `application/json` body.
    pub async fn write_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), HttpError> {
        let body = serde_json::to_vec(value)?;
        self.write_bytes("application/json", &body).await
    }

    /// Copy a byte source into the body.
    ///
    /// With a known `length` the body is sent with `Content-Length`, otherwise
    /// chunked. A missing source is answered with 404. The response is left
    /// open so the caller may still flush or close it.
    pub async fn write_stream<R>(
        &mut self,
        source: Option<R>,
        content_type: &str,
        length: Option<u64>,
    ) -> Result<(), HttpError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let Some(mut source) = source else {
            return Err(HttpError::not_found("The stream was null"));
        };

        self.set_header("Content-Type", content_type)?;
        if let Some(length) = length {
            self.set_header("Content-Length", length.to_string())?;
        }
        self.open().await?;

        let mut buf = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = source.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            self.write(&buf[..n]).await?;
        }
    }

    /// Stream a local file. A missing file is answered with 404, an unreadable
    /// one with 403.
    pub async fn write_file(&mut self, path: impl AsRef<Path>, content_type: &str) -> Result<(), HttpError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| file_error(path, e))?;
        let length = file.metadata().await.map_err(|e| file_error(path, e))?.len();
        self.write_stream(Some(file), content_type, Some(length)).await
    }

    /// Stream a packaged resource. An unknown name is answered with 404.
    pub async fn write_resource(
        &mut self,
        resources: &Resources,
        name: &str,
        content_type: &str,
    ) -> Result<(), HttpError> {
        let Some(bytes) = resources.get(name) else {
            return Err(HttpError::not_found(format!("Resource {name} not found")));
        };
        self.write_stream(Some(bytes), content_type, Some(bytes.len() as u64))
            .await
    }

    /// Write the interim `100 Continue` status line.
    pub(crate) async fn send_continue(&mut self) -> Result<(), HttpError> {
        self.check_mutable()?;
        self.sink.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        self.sink.flush().await?;
        Ok(())
    }

    /// Drop everything set so far, keeping only the `Server` header.
    pub(crate) fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.reason = None;
        self.headers = Headers::new();
        if let Some(server) = &self.server {
            self.headers.set("Server", server.clone());
        }
        self.writer_opened = false;
    }

    pub(crate) async fn flush_sink(&mut self) -> Result<(), HttpError> {
        self.sink.flush().await?;
        Ok(())
    }

    fn check_mutable(&self) -> Result<(), HttpError> {
        if self.is_committed() {
            return Err(HttpError::internal("Response headers were already sent"));
        }
        Ok(())
    }
}

pub(super) fn file_error(path: &Path, err: std::io::Error) -> HttpError {
    match err.kind() {
        ErrorKind::NotFound => HttpError::not_found(format!("File {} not found", path.display())),
        ErrorKind::PermissionDenied => HttpError::new(
            StatusCode::FORBIDDEN,
            format!("Access to {} is forbidden", path.display()),
        ),
        _ => HttpError::internal(err),
    }
}

/// Text body writer returned by [`Response::open_writer`].
pub struct TextWriter<'a, 'w> {
    response: &'a mut Response<'w>,
}

impl TextWriter<'_, '_> {
    pub async fn write(&mut self, text: &str) -> Result<(), HttpError> {
        self.response.write(text.as_bytes()).await
    }

    pub async fn flush(&mut self) -> Result<(), HttpError> {
        self.response.flush().await
    }

    /// Close the writer and the response body.
    pub async fn close(self) -> Result<(), HttpError> {
        self.response.close().await
    }
}
