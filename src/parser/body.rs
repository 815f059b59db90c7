//! Request body source.

use std::fmt;

use tokio::io::AsyncBufRead;

use crate::codec::{ChunkedDecoder, LengthBound};
use crate::server::HttpError;

/// The connection's buffered read half, type-erased.
pub type BodySource<'r> = dyn AsyncBufRead + Unpin + Send + Sync + 'r;

enum Framing {
    Chunked(ChunkedDecoder),
    Length(LengthBound),
}

/// A request entity read straight off the connection.
///
/// The body borrows the connection's reader, so it can only be read while the
/// exchange is in progress. Bytes the handler leaves unread are discarded by
/// the connection before the next request is parsed.
pub struct Body<'r> {
    source: &'r mut BodySource<'r>,
    framing: Framing,
}

impl<'r> Body<'r> {
    pub(crate) fn chunked(source: &'r mut BodySource<'r>) -> Self {
        Self {
            source,
            framing: Framing::Chunked(ChunkedDecoder::new()),
        }
    }

    pub(crate) fn fixed(source: &'r mut BodySource<'r>, length: u64) -> Self {
        Self {
            source,
            framing: Framing::Length(LengthBound::reader(length)),
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.framing, Framing::Chunked(_))
    }

    /// Bytes left to read for a fixed-length body; `None` when chunked.
    pub fn remaining(&self) -> Option<u64> {
        match &self.framing {
            Framing::Chunked(_) => None,
            Framing::Length(bound) => Some(bound.read_remaining()),
        }
    }

    /// Read body bytes into `buf`, returning `Ok(0)` at the end of the body.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, HttpError> {
        let n = match &mut self.framing {
            Framing::Chunked(decoder) => decoder.read(&mut *self.source, buf).await?,
            Framing::Length(bound) => bound.read(&mut *self.source, buf).await?,
        };
        Ok(n)
    }

    /// Append the rest of the body to `out`, returning the number of bytes read.
    pub async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize, HttpError> {
        let mut buf = [0u8; 1024];
        let mut total = 0;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&buf[..n]);
            total += n;
        }
    }

    /// Read and discard whatever is left of the body.
    pub(crate) async fn drain(&mut self) -> Result<u64, HttpError> {
        let mut buf = [0u8; 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}

impl fmt::Debug for Body<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("chunked", &self.is_chunked())
            .field("remaining", &self.remaining())
            .finish()
    }
}
