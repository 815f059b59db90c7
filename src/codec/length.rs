//! Fixed-length (`Content-Length`) body framing.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::error::Error;

/// Enforces exact byte budgets on a body.
///
/// The read and write counters are independent: a request body uses the read
/// side, a response body the write side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthBound {
    read_remaining: u64,
    write_remaining: u64,
}

impl LengthBound {
    pub fn new(read_length: u64, write_length: u64) -> Self {
        Self {
            read_remaining: read_length,
            write_remaining: write_length,
        }
    }

    /// A codec for reading a body of exactly `length` bytes.
    pub fn reader(length: u64) -> Self {
        Self::new(length, 0)
    }

    /// A codec for writing a body of exactly `length` bytes.
    pub fn writer(length: u64) -> Self {
        Self::new(0, length)
    }

    pub fn read_remaining(&self) -> u64 {
        self.read_remaining
    }

    pub fn write_remaining(&self) -> u64 {
        self.write_remaining
    }

    /// Read at most the remaining budget. At zero budget this returns `Ok(0)`
    /// without touching `source`.
    pub async fn read<R>(&mut self, source: &mut R, buf: &mut [u8]) -> Result<usize, Error>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let count = buf.len().min(usize::try_from(self.read_remaining).unwrap_or(usize::MAX));
        if count == 0 {
            return Ok(0);
        }

        let n = source.read(&mut buf[..count]).await?;
        if n == 0 {
            return Err(Error::UnexpectedEof("fixed-length body"));
        }
        self.read_remaining -= n as u64;
        Ok(n)
    }

    /// Write `data` if it fits the remaining budget. Otherwise the part that
    /// fits is written and [`Error::Overflow`] is returned; the body is then
    /// unusable.
    pub async fn write<W>(&mut self, sink: &mut W, data: &[u8]) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let len = data.len() as u64;
        if len > self.write_remaining {
            let allowed = self.write_remaining as usize;
            if allowed > 0 {
                sink.write_all(&data[..allowed]).await?;
                self.write_remaining = 0;
            }
            return Err(Error::Overflow { excess: len - allowed as u64 });
        }

        sink.write_all(data).await?;
        self.write_remaining -= len;
        Ok(())
    }

    /// Check that the whole declared length was written.
    pub fn finish_write(&self) -> Result<(), Error> {
        if self.write_remaining > 0 {
            return Err(Error::Underflow { remaining: self.write_remaining });
        }
        Ok(())
    }
}
