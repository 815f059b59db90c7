//! Tests for the HTTP server implementation.

#[cfg(test)]
mod server_tests {
    use std::io::{self, Cursor};
    use std::net::SocketAddr;
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    use async_trait::async_trait;
    use serde::Serialize;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio::task::JoinSet;

    use crate::parser::{Endpoints, Method, Request};
    use crate::server::response::file_error;
    use crate::server::{
        Connection, Handler, HttpError, HttpServer, Pattern, PatternError, Resources, Response,
        Router, Routes, ServerConfig, StatusCode,
    };

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Mock TcpStream for testing
    struct MockTcpStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
        fail_flush: bool,
    }

    impl MockTcpStream {
        fn new(read_data: Vec<u8>) -> Self {
            Self {
                read_data: Cursor::new(read_data),
                write_data: Vec::new(),
                fail_flush: false,
            }
        }

        fn with_failing_flush(mut self) -> Self {
            self.fail_flush = true;
            self
        }

        fn written_data(&self) -> &[u8] {
            &self.write_data
        }
    }

    impl AsyncRead for MockTcpStream {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let n = std::io::Read::read(&mut this.read_data, buf.initialize_unfilled())?;
            buf.advance(n);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockTcpStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            this.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            if self.fail_flush {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away")));
            }
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn endpoints() -> Endpoints {
        Endpoints {
            local: "127.0.0.1:8080".parse::<SocketAddr>().unwrap(),
            remote: "127.0.0.1:50000".parse::<SocketAddr>().unwrap(),
        }
    }

    /// Run one connection over `input` and return everything written back.
    async fn converse(router: Router, config: ServerConfig, input: &[u8]) -> String {
        init_logging();
        let mut stream = MockTcpStream::new(input.to_vec());
        Connection::new(&mut stream, endpoints(), Arc::new(router), Arc::new(config))
            .run()
            .await;
        String::from_utf8_lossy(stream.written_data()).into_owned()
    }

    fn status_lines(output: &str) -> usize {
        output.matches("HTTP/1.1 ").count()
    }

    struct Text(&'static str);

    #[async_trait]
    impl Handler for Text {
        async fn handle(&self, _request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            response.write_text("text/plain", self.0).await
        }
    }

    struct WhereAmI;

    #[async_trait]
    impl Handler for WhereAmI {
        async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            let body = format!("{} {}", request.context_path(), request.relative_path());
            response.write_text("text/plain", &body).await
        }
    }

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            let text = request.read_text().await?.unwrap_or_default();
            response.write_text("text/plain", &format!("got: {text}")).await
        }
    }

    struct Session;

    #[async_trait]
    impl Handler for Session {
        async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            let body = format!(
                "{} {}",
                request.param("session").unwrap_or("-"),
                request.param("target").unwrap_or("-")
            );
            response.write_text("text/plain", &body).await
        }
    }

    struct Overflow;

    #[async_trait]
    impl Handler for Overflow {
        async fn handle(&self, _request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            response.set_header("Content-Length", "5")?;
            response.write(b"hello!").await
        }
    }

    struct Ignore;

    #[async_trait]
    impl Handler for Ignore {
        async fn handle(&self, _request: &mut Request<'_>, _response: &mut Response<'_>) -> Result<(), HttpError> {
            Ok(())
        }
    }

    struct NoContent;

    #[async_trait]
    impl Handler for NoContent {
        async fn handle(&self, _request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            response.set_status(StatusCode::NO_CONTENT)
        }
    }

    struct Decline;

    #[async_trait]
    impl Handler for Decline {
        async fn handle(&self, _request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            response.write_text("text/plain", "should not run").await
        }

        fn should_continue(&self, _request: &Request<'_>) -> bool {
            false
        }
    }

    struct Failing;

    #[async_trait]
    impl Handler for Failing {
        async fn handle(&self, _request: &mut Request<'_>, _response: &mut Response<'_>) -> Result<(), HttpError> {
            let cause = io::Error::new(io::ErrorKind::Other, "disk <on fire>");
            Err(HttpError::internal(cause))
        }
    }

    struct Flagged(Arc<AtomicBool>);

    #[async_trait]
    impl Handler for Flagged {
        async fn handle(&self, _request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
            response.write_text("text/plain", "flagged").await
        }

        fn shutdown(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_keep_alive_serves_sequential_requests() {
        let router = Router::new().mount("/hello", Text("Hello"));
        let output = converse(
            router,
            ServerConfig::default(),
            b"GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\nGET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n",
        )
        .await;

        assert_eq!(status_lines(&output), 2);
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(output.contains("Transfer-Encoding: chunked\r\n\r\n5\r\nHello\r\n0\r\n\r\n"));
        assert!(output.contains(concat!("Server: clawhttp/", env!("CARGO_PKG_VERSION"))));
    }

    #[tokio::test]
    async fn test_method_not_allowed_keeps_connection() {
        let routes = Routes::new().get("/item", Text("item")).unwrap();
        let router = Router::new().mount("/", routes);
        let output = converse(
            router,
            ServerConfig::default(),
            b"POST /item HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /item HTTP/1.1\r\n\r\n",
        )
        .await;

        assert!(output.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(output.contains("Content-Type: text/html; charset=utf-8\r\n"));
        assert!(output.contains("Allowed methods: GET"));
        assert!(output.contains("\r\nAllow: GET\r\n"));
        assert!(!output.contains("Connection: close"));
        assert_eq!(status_lines(&output), 2);
        assert!(output.contains("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_unmapped_path_is_not_found() {
        let router = Router::new().mount("/app", Text("app"));
        let output = converse(router, ServerConfig::default(), b"GET /apple HTTP/1.1\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(output.contains("<dt>Path</dt><dd>/apple</dd>"));
        assert!(output.contains("Powered by clawhttp/"));
    }

    #[tokio::test]
    async fn test_error_page_content_length_matches() {
        let output = converse(Router::new(), ServerConfig::default(), b"GET /missing HTTP/1.1\r\n\r\n").await;

        let (head, body) = output.split_once("\r\n\r\n").unwrap();
        let length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(length, body.len());
    }

    #[tokio::test]
    async fn test_chunked_request_body() {
        let router = Router::new().mount("/echo", Echo);
        let output = converse(
            router,
            ServerConfig::default(),
            b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\ntest\r\n0\r\n\r\n",
        )
        .await;

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.contains("9\r\ngot: test\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_content_length_overflow_closes_connection() {
        let router = Router::new().mount("/", Overflow);
        let output = converse(
            router,
            ServerConfig::default(),
            b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(output.contains("Content-Length: 5\r\n"));
        assert!(output.ends_with("\r\n\r\nhello"));
        assert_eq!(status_lines(&output), 1);
    }

    #[tokio::test]
    async fn test_connection_close_ends_keep_alive() {
        let router = Router::new().mount("/", Text("ok"));
        let output = converse(
            router,
            ServerConfig::default(),
            b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\nConnection: close\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;

        assert_eq!(status_lines(&output), 2);
    }

    #[tokio::test]
    async fn test_http10_closes_by_default() {
        let router = Router::new().mount("/", Text("ok"));
        let output = converse(
            router,
            ServerConfig::default(),
            b"GET / HTTP/1.0\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;
        assert_eq!(status_lines(&output), 1);

        let router = Router::new().mount("/", Text("ok"));
        let output = converse(
            router,
            ServerConfig::default(),
            b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;
        assert_eq!(status_lines(&output), 2);
    }

    #[tokio::test]
    async fn test_longest_context_wins() {
        let router = Router::new().mount("/app", WhereAmI).mount("app/sub/", WhereAmI);

        let output = converse(router, ServerConfig::default(), b"GET /app/sub/x HTTP/1.1\r\n\r\n").await;
        assert!(output.contains("/app/sub /x"));

        let router = Router::new().mount("/app", WhereAmI).mount("/app/sub", WhereAmI);
        let output = converse(router, ServerConfig::default(), b"GET /app HTTP/1.1\r\n\r\n").await;
        assert!(output.contains("/app /"));
    }

    #[test]
    fn test_router_resolve() {
        let router = Router::new().mount("/", Text("root")).mount("/app", Text("app"));
        assert_eq!(router.contexts().collect::<Vec<_>>(), vec!["/app", "/"]);

        let resolved = router.resolve("/app/");
        assert_eq!(resolved.context_path, "/app");
        assert_eq!(resolved.relative_path, "/");

        let resolved = router.resolve("/apple");
        assert_eq!(resolved.context_path, "/");
        assert_eq!(resolved.relative_path, "/apple");
    }

    #[test]
    fn test_pattern_captures() {
        let pattern = Pattern::new("/session/:session/element/:target").unwrap();

        let captures = pattern.captures("/session/abc/element/def").unwrap();
        assert_eq!(captures.len(), 2);
        assert_eq!(captures["session"], "abc");
        assert_eq!(captures["target"], "def");

        assert!(pattern.captures("/session/abc/element/def/").is_some());
        assert!(pattern.captures("/session/abc").is_none());
        assert!(pattern.captures("/sessions/abc/element/def").is_none());
        assert!(pattern.captures("/session/a/b/element/def").is_none());
    }

    #[test]
    fn test_pattern_literals_are_escaped() {
        let pattern = Pattern::new("/file.txt").unwrap();
        assert!(pattern.captures("/file.txt").is_some());
        assert!(pattern.captures("/fileXtxt").is_none());

        let root = Pattern::new("/").unwrap();
        assert!(root.captures("/").is_some());
        assert!(root.captures("/x").is_none());
    }

    #[test]
    fn test_pattern_rejects_bad_names() {
        assert!(matches!(Pattern::new("/a/:"), Err(PatternError::InvalidName { .. })));
        assert!(matches!(Pattern::new("/a/:x-y"), Err(PatternError::InvalidName { .. })));
        assert!(matches!(Pattern::new("/:id/:id"), Err(PatternError::DuplicateName { .. })));
    }

    #[tokio::test]
    async fn test_route_captures_reach_handler() {
        let routes = Routes::new()
            .get("/session/:session/element/:target", Session)
            .unwrap()
            .route(Method::DELETE, "/session/:session", Text("deleted"))
            .unwrap();
        let router = Router::new().mount("/wd/hub", routes);

        let output = converse(
            router,
            ServerConfig::default(),
            b"GET /wd/hub/session/abc/element/def HTTP/1.1\r\n\r\nGET /wd/hub/session/abc HTTP/1.1\r\n\r\n",
        )
        .await;

        assert!(output.contains("abc def"));
        assert!(output.contains("HTTP/1.1 405 Method Not Allowed\r\n"));
    }

    #[tokio::test]
    async fn test_expect_continue() {
        let router = Router::new().mount("/echo", Echo);
        let output = converse(
            router,
            ServerConfig::default(),
            b"POST /echo HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\ntest",
        )
        .await;

        assert!(output.starts_with("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\n"));
        assert!(output.contains("got: test"));
    }

    #[tokio::test]
    async fn test_expect_declined() {
        let router = Router::new().mount("/", Decline);
        let output = converse(
            router,
            ServerConfig::default(),
            b"POST / HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\n\r\ntest",
        )
        .await;

        assert!(output.starts_with("HTTP/1.1 417 Expectation Failed\r\n"));
        assert!(output.contains("Connection: close\r\n"));
        assert!(!output.contains("should not run"));
    }

    #[tokio::test]
    async fn test_unknown_expectation() {
        let router = Router::new().mount("/", Echo);
        let output = converse(router, ServerConfig::default(), b"GET / HTTP/1.1\r\nExpect: magic\r\n\r\n").await;
        assert!(output.starts_with("HTTP/1.1 417 Expectation Failed\r\n"));
    }

    #[tokio::test]
    async fn test_malformed_request_line() {
        let output = converse(Router::new(), ServerConfig::default(), b"GARBAGE\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output.contains("Connection: close\r\n"));
        assert!(output.contains("Request details not available"));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let output = converse(Router::new(), ServerConfig::default(), b"GET / HTTP/2.0\r\n\r\n").await;
        assert!(output.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
    }

    #[tokio::test]
    async fn test_request_line_too_long() {
        let mut input = b"GET /".to_vec();
        input.extend(std::iter::repeat(b'a').take(20_000));
        input.extend_from_slice(b" HTTP/1.1\r\n\r\n");

        let output = converse(Router::new(), ServerConfig::default(), &input).await;
        assert!(output.starts_with("HTTP/1.1 414 Request-URI Too Long\r\n"));
    }

    #[tokio::test]
    async fn test_silent_close_on_empty_connection() {
        let output = converse(Router::new(), ServerConfig::default(), b"").await;
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_unread_body_is_drained() {
        let router = Router::new().mount("/", Ignore);
        let output = converse(
            router,
            ServerConfig::default(),
            b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhelloPOST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\nGET / HTTP/1.1\r\n\r\n",
        )
        .await;

        assert_eq!(status_lines(&output), 3);
        assert_eq!(output.matches("Content-Length: 0\r\n").count(), 3);
    }

    #[tokio::test]
    async fn test_no_content_has_no_framing() {
        let router = Router::new().mount("/", NoContent);
        let output = converse(router, ServerConfig::default(), b"GET / HTTP/1.1\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!output.contains("Content-Length"));
        assert!(!output.contains("Transfer-Encoding"));
    }

    #[tokio::test]
    async fn test_flush_failure_closes_connection() {
        init_logging();
        let mut stream =
            MockTcpStream::new(b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n".to_vec()).with_failing_flush();
        let router = Router::new().mount("/", Text("once"));
        Connection::new(&mut stream, endpoints(), Arc::new(router), Arc::new(ServerConfig::default()))
            .run()
            .await;

        let output = String::from_utf8_lossy(stream.written_data()).into_owned();
        assert_eq!(status_lines(&output), 1);
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_exchange_count_excludes_final_eof() {
        init_logging();
        let mut stream = MockTcpStream::new(b"GET / HTTP/1.1\r\n\r\nGET / HTTP/1.1\r\n\r\n".to_vec());
        let router = Router::new().mount("/", Text("twice"));
        let served = Connection::new(&mut stream, endpoints(), Arc::new(router), Arc::new(ServerConfig::default()))
            .run()
            .await;
        assert_eq!(served, 2);

        let mut idle = MockTcpStream::new(Vec::new());
        let served = Connection::new(&mut idle, endpoints(), Arc::new(Router::new()), Arc::new(ServerConfig::default()))
            .run()
            .await;
        assert_eq!(served, 0);
        assert!(idle.written_data().is_empty());
    }

    #[tokio::test]
    async fn test_zero_read_buffer_is_raised() {
        let config = ServerConfig {
            read_buffer_size: 0,
            ..ServerConfig::default()
        };
        assert!(config.read_buffer_capacity() > 0);

        let router = Router::new().mount("/", Text("ok"));
        let output = converse(router, config, b"GET / HTTP/1.1\r\n\r\n").await;
        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn test_no_content_ignores_chunked_header() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response.set_status(StatusCode::NO_CONTENT).unwrap();
        response.set_header("Transfer-Encoding", "chunked").unwrap();
        response.close().await.unwrap();
        drop(response);

        let output = String::from_utf8(sink).unwrap();
        assert_eq!(output, "HTTP/1.1 204 No Content\r\n\r\n");
    }

    #[tokio::test]
    async fn test_unexpected_failure_is_internal_error() {
        let router = Router::new().mount("/", Failing);
        let output = converse(router, ServerConfig::default(), b"GET /boom?x=<b> HTTP/1.1\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(output.contains("disk &lt;on fire&gt;"));
        assert!(output.contains("<dt>Query</dt><dd>x=&lt;b&gt;</dd>"));
    }

    #[tokio::test]
    async fn test_server_header_disabled() {
        let config = ServerConfig {
            server_header: None,
            ..ServerConfig::default()
        };
        let output = converse(Router::new().mount("/", Text("ok")), config, b"GET / HTTP/1.1\r\n\r\n").await;

        assert!(output.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(!output.contains("Server:"));
    }

    #[tokio::test]
    async fn test_response_headers_freeze_after_commit() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response.set_status(StatusCode::CREATED).unwrap();
        response.set_reason("Made").unwrap();
        response.write(b"abc").await.unwrap();

        assert!(response.is_committed());
        assert!(response.set_status(StatusCode::OK).is_err());
        assert!(response.set_header("X-Late", "1").is_err());
        assert!(response.open_writer("text/plain").is_err());
        response.close().await.unwrap();
        response.close().await.unwrap();
        drop(response);

        let output = String::from_utf8(sink).unwrap();
        assert_eq!(
            output,
            "HTTP/1.1 201 Made\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_open_writer_only_once() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        assert!(response.open_writer("text/plain").is_ok());
        assert!(response.open_writer("text/plain").is_err());
    }

    #[tokio::test]
    async fn test_invalid_content_length_fails_before_commit() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response.set_header("Content-Length", "lots").unwrap();

        let err = response.write(b"x").await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!response.is_committed());
    }

    #[tokio::test]
    async fn test_content_length_underflow_on_close() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response.set_header("Content-Length", "10").unwrap();
        response.write(b"short").await.unwrap();
        assert!(response.close().await.is_err());
    }

    #[derive(Serialize)]
    struct Status {
        ready: bool,
    }

    #[tokio::test]
    async fn test_write_json() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response.write_json(&Status { ready: true }).await.unwrap();
        drop(response);

        let output = String::from_utf8(sink).unwrap();
        assert!(output.contains("Content-Type: application/json\r\n"));
        assert!(output.contains("Content-Length: 14\r\n"));
        assert!(output.ends_with("\r\n\r\n{\"ready\":true}"));
    }

    #[tokio::test]
    async fn test_write_resource() {
        let resources = Resources::new().with("static/app.js", b"alert(1);");

        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response
            .write_resource(&resources, "/static/app.js", "application/javascript")
            .await
            .unwrap();
        response.close().await.unwrap();
        drop(response);
        let output = String::from_utf8(sink).unwrap();
        assert!(output.contains("Content-Length: 9\r\n"));
        assert!(output.ends_with("alert(1);"));

        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        let err = response
            .write_resource(&resources, "missing.js", "application/javascript")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert!(!response.is_committed());
    }

    #[tokio::test]
    async fn test_write_stream_without_source() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        let err = response
            .write_stream(None::<&[u8]>, "text/plain", None)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message(), "The stream was null");
    }

    #[tokio::test]
    async fn test_write_stream_chunks_unknown_length() {
        let data = vec![b'z'; 3000];
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        response
            .write_stream(Some(data.as_slice()), "application/octet-stream", None)
            .await
            .unwrap();
        response.close().await.unwrap();
        drop(response);

        let output = String::from_utf8(sink).unwrap();
        assert!(output.contains("Transfer-Encoding: chunked\r\n"));
        assert_eq!(output.matches("400\r\n").count(), 2);
        assert!(output.ends_with("\r\n0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_write_missing_file() {
        let mut sink: Vec<u8> = Vec::new();
        let mut response = Response::new(&mut sink, None);
        let err = response
            .write_file("/nonexistent/clawhttp/file.txt", "text/plain")
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unreadable_file_is_forbidden() {
        let err = file_error(
            Path::new("/srv/secret.txt"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert!(err.message().contains("/srv/secret.txt"));

        let err = file_error(Path::new("/srv/broken"), io::Error::from(io::ErrorKind::Other));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_http_error_headers() {
        let err = HttpError::method_not_allowed("nope").with_header("Allow", "GET, PUT");
        assert_eq!(err.headers(), [("Allow".to_string(), "GET, PUT".to_string())]);
    }

    #[test]
    fn test_http_error_reason() {
        let err = HttpError::new(404u16, "gone");
        assert_eq!(err.reason(), "Not Found");
        assert!(err.is_routine());

        let err = HttpError::new(599u16, "odd").with_reason("Custom");
        assert_eq!(err.reason(), "Custom");
        assert_eq!(StatusCode(599).reason_phrase(), "Unknown Status");
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: ServerConfig = serde_json::from_str(r#"{"max_connections": 4, "server_header": null}"#).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.server_header, None);
        assert_eq!(config.request_line_timeout, std::time::Duration::from_secs(10));
    }

    async fn loopback_server(config: ServerConfig, router: Router) -> (HttpServer, TcpListener, SocketAddr) {
        init_logging();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (HttpServer::new(config, router), listener, addr)
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let shut_down = Arc::new(AtomicBool::new(false));
        let router = Router::new().mount("/flag", Flagged(shut_down.clone()));
        let (server, listener, addr) = loopback_server(ServerConfig::default(), router).await;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream
                .write_all(b"GET /flag HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            shutdown_tx.send(()).await.unwrap();
            String::from_utf8(response).unwrap()
        };

        let (result, response) = tokio::join!(server.serve_until(listener, shutdown_rx, JoinSet::new()), client);
        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("7\r\nflagged\r\n0\r\n\r\n"));
        assert!(shut_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_finished_connections_are_released() {
        let (server, listener, addr) = loopback_server(ServerConfig::default(), Router::new().mount("/", Text("hi"))).await;
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let mut tasks = JoinSet::new();

        let client = async {
            for _ in 0..5 {
                let mut stream = TcpStream::connect(addr).await.unwrap();
                stream
                    .write_all(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n")
                    .await
                    .unwrap();
                let mut response = Vec::new();
                stream.read_to_end(&mut response).await.unwrap();
                assert!(response.starts_with(b"HTTP/1.1 200 OK\r\n"));
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            shutdown_tx.send(()).await.unwrap();
        };

        tokio::join!(server.accept_until(&listener, &mut shutdown_rx, &mut tasks), client);
        assert!(tasks.is_empty(), "{} finished connections still tracked", tasks.len());
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let config = ServerConfig {
            max_connections: 0,
            ..ServerConfig::default()
        };
        let (server, listener, addr) = loopback_server(config, Router::new()).await;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await.unwrap();
            shutdown_tx.send(()).await.unwrap();
            String::from_utf8(response).unwrap()
        };

        let (result, response) = tokio::join!(server.serve_until(listener, shutdown_rx, JoinSet::new()), client);
        assert!(result.is_ok());
        assert!(response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        assert!(response.ends_with("please try again later"));
    }
}
