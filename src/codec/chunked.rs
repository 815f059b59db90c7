//! Chunked transfer coding (RFC 9112 section 7.1).

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::error::Error;
use crate::parser::{read_line, Error as ParserError};

/// Size of the encoder's block buffer; a full block is emitted as one chunk.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;

/// Decodes a chunked body from a buffered source.
#[derive(Debug, Default)]
pub struct ChunkedDecoder {
    /// Bytes of the current chunk not yet handed out.
    remaining: u64,
    /// Set once the zero-length chunk and its blank line were consumed.
    done: bool,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Read decoded bytes into `buf`. Returns `Ok(0)` at the end of the body,
    /// and keeps returning `Ok(0)` afterwards without touching `source`.
    pub async fn read<R>(&mut self, source: &mut R, buf: &mut [u8]) -> Result<usize, Error>
    where
        R: AsyncBufRead + Unpin + ?Sized,
    {
        if self.done || buf.is_empty() {
            return Ok(0);
        }

        if self.remaining == 0 {
            let line = next_line(source).await?;
            let size = parse_chunk_size(&line)?;
            if size == 0 {
                self.done = true;
                expect_blank_line(source).await?;
                return Ok(0);
            }
            self.remaining = size;
        }

        let want = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::UnexpectedEof("chunk data"));
        }
        self.remaining -= n as u64;

        if self.remaining == 0 {
            expect_blank_line(source).await?;
        }
        Ok(n)
    }
}

fn parse_chunk_size(line: &str) -> Result<u64, Error> {
    let number = line.split_once(';').map_or(line, |(size, _ext)| size).trim();
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidChunkSize(line.to_string()));
    }
    u64::from_str_radix(number, 16).map_err(|_| Error::InvalidChunkSize(line.to_string()))
}

async fn next_line<R>(source: &mut R) -> Result<String, Error>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    match read_line(source).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(Error::UnexpectedEof("chunked data")),
        Err(ParserError::Io(e)) => Err(Error::Io(e)),
        Err(e) => Err(Error::InvalidChunkSize(e.to_string())),
    }
}

async fn expect_blank_line<R>(source: &mut R) -> Result<(), Error>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let line = next_line(source).await?;
    if !line.is_empty() {
        return Err(Error::MissingChunkBoundary(line));
    }
    Ok(())
}

/// Encodes a body as chunks of at most [`OUTPUT_CHUNK_SIZE`] bytes.
#[derive(Debug)]
pub struct ChunkedEncoder {
    buffer: Vec<u8>,
    closed: bool,
}

impl Default for ChunkedEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(OUTPUT_CHUNK_SIZE),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Buffer `data`, emitting a chunk each time the block fills.
    pub async fn write<W>(&mut self, sink: &mut W, mut data: &[u8]) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.closed {
            return Err(Error::Closed);
        }

        while !data.is_empty() {
            let take = (OUTPUT_CHUNK_SIZE - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buffer.len() == OUTPUT_CHUNK_SIZE {
                self.emit_chunk(sink).await?;
            }
        }
        Ok(())
    }

    /// Emit any buffered bytes as a chunk and flush the sink.
    pub async fn flush<W>(&mut self, sink: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.emit_chunk(sink).await?;
        sink.flush().await?;
        Ok(())
    }

    /// Flush the remainder and write the terminal zero-length chunk.
    pub async fn close<W>(&mut self, sink: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.closed {
            return Ok(());
        }
        self.emit_chunk(sink).await?;
        self.closed = true;
        sink.write_all(b"0\r\n\r\n").await?;
        sink.flush().await?;
        Ok(())
    }

    async fn emit_chunk<W>(&mut self, sink: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let size_line = format!("{:x}\r\n", self.buffer.len());
        sink.write_all(size_line.as_bytes()).await?;
        sink.write_all(&self.buffer).await?;
        sink.write_all(b"\r\n").await?;
        self.buffer.clear();
        Ok(())
    }
}
