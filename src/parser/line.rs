//! Line-oriented parsing of the request head.

use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::parser::error::Error;
use crate::parser::headers::Headers;
use crate::parser::method::Method;
use crate::parser::version::HttpVersion;

/// Longest request or header line accepted, in bytes, including the line terminator.
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// The three tokens of a request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: HttpVersion,
}

/// Read one line, decoding bytes as ASCII/Latin-1 and stripping the CR LF.
///
/// Returns `None` when the stream is at EOF before any byte was read. A final
/// line without terminator is returned as-is.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, Error>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if n == MAX_LINE_LENGTH && buf.last() != Some(&b'\n') {
        return Err(Error::LineTooLong { limit: MAX_LINE_LENGTH, request_line: false });
    }

    let line: String = buf.iter().map(|&b| b as char).collect();
    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
}

/// Split a request line into method, target and version.
pub fn parse_request_line(line: &str) -> Result<RequestLine, Error> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() != 3 {
        return Err(Error::MalformedRequestLine(line.to_string()));
    }

    let version = HttpVersion::from_str(parts[2])?;
    let method = Method::from_str(parts[0])?;
    if parts[1].is_empty() {
        return Err(Error::MalformedRequestLine(line.to_string()));
    }

    Ok(RequestLine {
        method,
        target: parts[1].to_string(),
        version,
    })
}

/// Read header lines up to and including the terminating blank line.
pub async fn read_headers<R>(reader: &mut R) -> Result<Headers, Error>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut headers = Headers::new();
    loop {
        let line = read_line(reader).await?.ok_or(Error::UnexpectedEof)?;
        if line.is_empty() {
            return Ok(headers);
        }

        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::InvalidHeaderFormat(line));
        };
        headers.add(name.trim(), value.trim());
    }
}
