//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::net::SocketAddr;

use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;

use crate::parser::body::{Body, BodySource};
use crate::parser::error::Error;
use crate::parser::headers::Headers;
use crate::parser::line::{parse_request_line, read_headers, RequestLine};
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;
use crate::server::{ConnectionLog, ExchangeLog};
use crate::server::{HttpError, StatusCode};

/// Text encoding assumed when the request does not name a charset.
pub const DEFAULT_ENCODING: &str = "iso-8859-1";

/// The two ends of the connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

/// A parsed HTTP request.
///
/// Everything except the routing fields and the body is parsed once from the
/// request head. The request lives for one exchange only.
#[derive(Debug)]
pub struct Request<'r> {
    method: Method,
    path: String,
    query: String,
    version: HttpVersion,
    endpoints: Endpoints,
    host: String,
    port: u16,
    headers: Headers,
    content_type: Option<String>,
    encoding: String,
    context_path: String,
    relative_path: String,
    params: HashMap<String, String>,
    body: Option<Body<'r>>,
    log: &'r ConnectionLog,
}

impl<'r> Request<'r> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string after `?`, or an empty string.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.endpoints.local
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.endpoints.remote
    }

    /// Host name from the `Host` header, or the local address when absent.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The URL scheme; TLS is not supported so this is always `http`.
    pub fn protocol(&self) -> &'static str {
        "http"
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header, matching the name ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_first_ignore_case(name)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// The media type from `Content-Type`, with parameters stripped.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The lowercase charset from `Content-Type`, or [`DEFAULT_ENCODING`].
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// The context path of the handler this request was routed to.
    pub fn context_path(&self) -> &str {
        &self.context_path
    }

    /// The path remaining after the context path was stripped.
    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// A named capture from the route pattern that matched.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Whether the request carries an entity. A request with
    /// `Content-Length: 0` has an (empty) body; one without framing headers
    /// has none.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn body_mut(&mut self) -> Option<&mut Body<'r>> {
        self.body.as_mut()
    }

    /// A logger that identifies this exchange.
    pub fn log(&self) -> ExchangeLog<'_> {
        self.log.exchange(&self.method, &self.path)
    }

    /// Read the whole body, or `None` if the request has no body.
    pub async fn read_bytes(&mut self) -> Result<Option<Vec<u8>>, HttpError> {
        let hint = self
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0)
            .min(64 * 1024);
        let Some(body) = self.body.as_mut() else {
            return Ok(None);
        };

        let mut bytes = Vec::with_capacity(hint);
        body.read_to_end(&mut bytes).await?;
        Ok(Some(bytes))
    }

    /// Read the whole body as text in the request's encoding.
    pub async fn read_text(&mut self) -> Result<Option<String>, HttpError> {
        match self.read_bytes().await? {
            Some(bytes) => decode_text(bytes, &self.encoding).map(Some),
            None => Ok(None),
        }
    }

    /// Deserialize an `application/json` body.
    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<T, HttpError> {
        if self.content_type() != Some("application/json") {
            return Err(HttpError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "Expected Content-Type: application/json",
            ));
        }
        let bytes = self
            .read_bytes()
            .await?
            .ok_or_else(|| HttpError::bad_request("Request has no body"))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| HttpError::bad_request(format!("Invalid JSON body: {e}")).with_cause(e))
    }

    /// Query string parameters, percent-decoded, in order of appearance.
    pub fn parameters(&self) -> Vec<(String, String)> {
        parse_urlencoded(&self.query)
    }

    /// Parameters from an `application/x-www-form-urlencoded` body.
    ///
    /// Returns `None` for any other content type. `multipart/form-data` is
    /// rejected with 415.
    pub async fn read_parameters(&mut self) -> Result<Option<Vec<(String, String)>>, HttpError> {
        match self.content_type() {
            Some("application/x-www-form-urlencoded") => {
                let bytes = self.read_bytes().await?.unwrap_or_default();
                let text = decode_text(bytes, "us-ascii")?;
                Ok(Some(parse_urlencoded(&text)))
            }
            Some("multipart/form-data") => Err(HttpError::new(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "multipart/form-data decoding is not supported",
            )),
            _ => Ok(None),
        }
    }

    /// An absolute URL for a path relative to this request's context.
    pub fn url(&self, relative: &str) -> String {
        let port = if self.port == 80 {
            String::new()
        } else {
            format!(":{}", self.port)
        };
        let context = if self.context_path == "/" {
            ""
        } else {
            self.context_path.as_str()
        };
        format!("{}://{}{}{}{}", self.protocol(), self.host, port, context, relative)
    }

    pub(crate) fn set_route(&mut self, context_path: &str, relative_path: String) {
        self.context_path = context_path.to_string();
        self.relative_path = relative_path;
    }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }
}

/// Parse a request from its request line and the connection's reader.
///
/// The headers are read from `reader`, which is then handed to the request
/// body (if any).
pub(crate) async fn read_request<'r>(
    line: &str,
    reader: &'r mut BodySource<'r>,
    endpoints: Endpoints,
    log: &'r ConnectionLog,
) -> Result<Request<'r>, HttpError> {
    let RequestLine { method, target, version } = parse_request_line(line)?;
    let headers = read_headers(&mut *reader).await?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (target, String::new()),
    };

    let (host, port) = match headers.get_first_ignore_case("Host") {
        Some(value) => parse_host(value)?,
        None => (endpoints.local.ip().to_string(), endpoints.local.port()),
    };

    let raw_content_type = headers.get_first_ignore_case("Content-Type");
    let content_type = raw_content_type.map(media_type);
    let encoding = raw_content_type
        .and_then(charset)
        .unwrap_or_else(|| DEFAULT_ENCODING.to_string());

    let body = select_body(&headers, reader)?;

    Ok(Request {
        relative_path: path.clone(),
        method,
        path,
        query,
        version,
        endpoints,
        host,
        port,
        headers,
        content_type,
        encoding,
        context_path: "/".to_string(),
        params: HashMap::new(),
        body,
        log,
    })
}

/// Chunked framing wins over `Content-Length`; with neither there is no body.
fn select_body<'r>(headers: &Headers, reader: &'r mut BodySource<'r>) -> Result<Option<Body<'r>>, Error> {
    let chunked = headers
        .get_first_ignore_case("Transfer-Encoding")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"));
    if chunked {
        return Ok(Some(Body::chunked(reader)));
    }

    match headers.get_first_ignore_case("Content-Length") {
        Some(value) => {
            let length = value
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::InvalidContentLength(value.to_string()))?;
            Ok(Some(Body::fixed(reader, length)))
        }
        None => Ok(None),
    }
}

fn parse_host(value: &str) -> Result<(String, u16), Error> {
    let invalid = || Error::InvalidHost(value.to_string());

    let (host, port) = if let Some(rest) = value.strip_prefix('[') {
        let (addr, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = match tail {
            "" => None,
            tail => Some(tail.strip_prefix(':').ok_or_else(invalid)?),
        };
        (format!("[{addr}]"), port)
    } else {
        match value.split_once(':') {
            Some((host, port)) => (host.to_string(), Some(port)),
            None => (value.to_string(), None),
        }
    };

    let port = match port {
        Some(port) => port.trim().parse::<u16>().map_err(|_| invalid())?,
        None => 80,
    };
    Ok((host.trim().to_string(), port))
}

fn media_type(content_type: &str) -> String {
    content_type
        .split_once(';')
        .map_or(content_type, |(media, _params)| media)
        .trim()
        .to_string()
}

fn charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let param = param.trim().to_ascii_lowercase();
        let value = param.strip_prefix("charset")?.trim_start().strip_prefix('=')?;
        Some(value.trim().trim_matches('"').to_string())
    })
}

fn decode_text(bytes: Vec<u8>, encoding: &str) -> Result<String, HttpError> {
    match encoding {
        "utf-8" | "utf8" => String::from_utf8(bytes).map_err(|e| {
            HttpError::bad_request("Request body is not valid UTF-8").with_cause(e)
        }),
        "iso-8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" => {
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
        "us-ascii" | "ascii" => {
            if bytes.is_ascii() {
                Ok(bytes.iter().map(|&b| b as char).collect())
            } else {
                Err(HttpError::bad_request("Request body is not valid US-ASCII"))
            }
        }
        other => Err(HttpError::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("Unsupported charset {other}"),
        )),
    }
}

fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    percent_decode_str(&s).decode_utf8_lossy().into_owned()
}
