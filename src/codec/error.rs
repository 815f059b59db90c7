//! Error types for body framing.

use thiserror::Error;

/// Errors raised while decoding or encoding a message body.
#[derive(Debug, Error)]
pub enum Error {
    /// A chunk-size line is not a hexadecimal number.
    #[error("Bad chunk length line {0:?}")]
    InvalidChunkSize(String),

    /// The CR LF after a chunk (or after the last chunk) is missing.
    #[error("Expected blank line after chunk but got {0:?}")]
    MissingChunkBoundary(String),

    /// The peer closed the stream in the middle of a body.
    #[error("Unexpected EOF in {0}")]
    UnexpectedEof(&'static str),

    /// More bytes were written than the declared length allows.
    #[error("Body exceeds declared length by {excess} bytes")]
    Overflow { excess: u64 },

    /// Fewer bytes were written than the declared length requires.
    #[error("Body ended {remaining} bytes short of declared length")]
    Underflow { remaining: u64 },

    /// The encoder was already closed.
    #[error("Write after body was closed")]
    Closed,

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the peer sent malformed framing (as opposed to a local or I/O failure).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidChunkSize(_) | Error::MissingChunkBoundary(_) | Error::UnexpectedEof(_)
        )
    }
}
