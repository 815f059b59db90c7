//! Body framing codecs.
//!
//! Two framings are supported in both directions: chunked transfer coding and
//! fixed length. Codecs only hold framing state; the stream they read from or
//! write to is passed in on every call, so the connection keeps ownership of
//! its socket halves.

mod chunked;
mod error;
mod length;

pub use chunked::{ChunkedDecoder, ChunkedEncoder, OUTPUT_CHUNK_SIZE};
pub use error::Error;
pub use length::LengthBound;
