//! The per-connection request loop.
//!
//! A [`Connection`] owns one accepted stream and serves exchanges on it one
//! at a time: read the request head, route it, answer `Expect`, run the
//! handler, close the response, drain what is left of the request body, and
//! go round again while the connection is keep-alive.

use std::sync::Arc;

use tokio::io::{split, AsyncBufRead, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::timeout;

use crate::parser::{read_line, read_request, Endpoints, Error as ParserError, HttpVersion, Request};
use crate::server::config::ServerConfig;
use crate::server::error::HttpError;
use crate::server::error_page;
use crate::server::handler::Handler;
use crate::server::logger::{ConnectionLog, ScopedLog};
use crate::server::response::Response;
use crate::server::router::Router;
use crate::server::status::StatusCode;

/// What to do after an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    KeepAlive,
    Close,
    /// The connection ended before a request line arrived.
    Idle,
}

/// One client connection.
pub struct Connection<S> {
    stream: S,
    endpoints: Endpoints,
    router: Arc<Router>,
    config: Arc<ServerConfig>,
    log: ConnectionLog,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + Sync,
{
    pub fn new(stream: S, endpoints: Endpoints, router: Arc<Router>, config: Arc<ServerConfig>) -> Self {
        Self {
            stream,
            endpoints,
            router,
            config,
            log: ConnectionLog::new(endpoints.remote),
        }
    }

    /// Serve requests until the client goes away or keep-alive ends.
    ///
    /// Returns the number of exchanges served.
    pub async fn run(self) -> u64 {
        let Connection {
            stream,
            endpoints,
            router,
            config,
            log,
        } = self;
        log.trace(format_args!("Connection accepted on {}", endpoints.local));

        let (read_half, write_half) = split(stream);
        let mut reader = BufReader::with_capacity(config.read_buffer_capacity(), read_half);
        let mut writer = BufWriter::new(write_half);

        let mut exchanges = 0u64;
        loop {
            match serve_exchange(&mut reader, &mut writer, endpoints, &router, &config, &log).await {
                Outcome::KeepAlive => exchanges += 1,
                Outcome::Close => {
                    exchanges += 1;
                    break;
                }
                Outcome::Idle => break,
            }
        }

        if let Err(e) = writer.shutdown().await {
            log.debug(format_args!("Shutdown failed: {e}"));
        }
        log.trace(format_args!("Connection closed after {exchanges} exchange(s)"));
        exchanges
    }
}

async fn serve_exchange<R, W>(
    reader: &mut R,
    writer: &mut W,
    endpoints: Endpoints,
    router: &Router,
    config: &ServerConfig,
    log: &ConnectionLog,
) -> Outcome
where
    R: AsyncBufRead + Unpin + Send + Sync,
    W: AsyncWrite + Unpin + Send + Sync,
{
    let server = config.server_header.as_deref();
    let mut response = Response::new(writer, config.server_header.clone());

    let line = match read_request_line(reader, config, log).await {
        Ok(Some(line)) => line,
        Ok(None) => return Outcome::Idle,
        Err(err) => {
            answer_early(&mut response, &err, None, server, log).await;
            return Outcome::Close;
        }
    };
    log.trace(format_args!("Request line {line:?}"));

    let mut request = match read_request(&line, reader, endpoints, log).await {
        Ok(request) => request,
        Err(err) => {
            answer_early(&mut response, &err, None, server, log).await;
            return Outcome::Close;
        }
    };

    let resolved = router.resolve(request.path());
    let handler = resolved.handler;
    request.set_route(resolved.context_path, resolved.relative_path);
    request.log().trace(format_args!(
        "Mapped to context {} as {}",
        request.context_path(),
        request.relative_path()
    ));

    let mut keep_alive = wants_keep_alive(&request);

    if let Err(err) = check_expectations(&request, handler.as_ref(), &mut response).await {
        answer_early(&mut response, &err, Some(&request), server, log).await;
        return Outcome::Close;
    }

    match handler.handle(&mut request, &mut response).await {
        Ok(()) => match response.close().await {
            Ok(()) => request.log().info(format_args!(
                "{} {}",
                response.status(),
                response.reason()
            )),
            Err(err) => {
                log_failure(&request.log(), &err);
                keep_alive = false;
            }
        },
        Err(err) if !response.is_committed() => {
            log_failure(&request.log(), &err);
            let page = error_page::render(&err, Some(&request), server);
            if let Err(send_err) = error_page::send(&mut response, &err, page, !keep_alive).await {
                request.log().debug(format_args!("Error page not delivered: {send_err}"));
                keep_alive = false;
            }
        }
        Err(err) => {
            request.log().error(format_args!(
                "Failed after response headers were sent, closing connection: {}",
                cause_chain(&err)
            ));
            keep_alive = false;
        }
    }

    if let Err(err) = response.flush_sink().await {
        request.log().debug(format_args!("Flush failed: {err}"));
        keep_alive = false;
    }

    if keep_alive {
        if let Some(body) = request.body_mut() {
            match body.drain().await {
                Ok(0) => {}
                Ok(n) => request.log().trace(format_args!("Discarded {n} unread body bytes")),
                Err(err) => {
                    request.log().debug(format_args!("Could not drain request body: {err}"));
                    keep_alive = false;
                }
            }
        }
    }

    if keep_alive {
        Outcome::KeepAlive
    } else {
        Outcome::Close
    }
}

/// Wait for the next request line. `Ok(None)` means the connection should end
/// without a response: EOF, timeout or I/O failure.
async fn read_request_line<R>(reader: &mut R, config: &ServerConfig, log: &ConnectionLog) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin + Send + Sync,
{
    loop {
        let line = match timeout(config.request_line_timeout, read_line(&mut *reader)).await {
            Err(_) => {
                log.trace(format_args!("Timed out waiting for a request"));
                return Ok(None);
            }
            Ok(Ok(None)) => return Ok(None),
            Ok(Ok(Some(line))) => line,
            Ok(Err(ParserError::LineTooLong { limit, .. })) => {
                return Err(ParserError::LineTooLong {
                    limit,
                    request_line: true,
                }
                .into());
            }
            Ok(Err(err)) => {
                log.trace(format_args!("Failed to read request line: {err}"));
                return Ok(None);
            }
        };

        // Stray CR LF between requests.
        if !line.is_empty() {
            return Ok(Some(line));
        }
    }
}

fn wants_keep_alive(request: &Request<'_>) -> bool {
    let has_token = |token: &str| {
        request
            .headers()
            .get_all_ignore_case("Connection")
            .iter()
            .flat_map(|value| value.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };

    match request.version() {
        HttpVersion::Http11 => !has_token("close"),
        HttpVersion::Http10 => has_token("keep-alive"),
    }
}

async fn check_expectations(
    request: &Request<'_>,
    handler: &dyn Handler,
    response: &mut Response<'_>,
) -> Result<(), HttpError> {
    let mut continued = false;
    for expectation in request.headers().get_all_ignore_case("Expect") {
        if !expectation.trim().eq_ignore_ascii_case("100-continue") {
            return Err(HttpError::new(
                StatusCode::EXPECTATION_FAILED,
                format!("Unsupported expectation {expectation:?}"),
            ));
        }
        if !handler.should_continue(request) {
            return Err(HttpError::new(
                StatusCode::EXPECTATION_FAILED,
                "Request body was declined",
            ));
        }
        if !continued {
            response.send_continue().await?;
            continued = true;
        }
    }
    Ok(())
}

/// Answer a failure that happened before the handler ran. The connection is
/// closed afterwards, so the page carries `Connection: close`.
async fn answer_early(
    response: &mut Response<'_>,
    err: &HttpError,
    request: Option<&Request<'_>>,
    server: Option<&str>,
    log: &ConnectionLog,
) {
    match request {
        Some(request) => log_failure(&request.log(), err),
        None => log_failure(log, err),
    }
    let page = error_page::render(err, request, server);
    if let Err(send_err) = error_page::send(response, err, page, true).await {
        log.debug(format_args!("Error page not delivered: {send_err}"));
    }
}

fn log_failure(log: &impl ScopedLog, err: &HttpError) {
    if err.is_routine() {
        log.info(format_args!("{} {}", err.status(), err.reason()));
        log.debug(format_args!("{err}"));
    } else {
        log.error(format_args!(
            "{} {}: {}",
            err.status(),
            err.reason(),
            cause_chain(err)
        ));
    }
}

fn cause_chain(err: &HttpError) -> String {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push_str(": caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
