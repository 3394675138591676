//! Readable sources - where a [`BufferedReader`] gets its bytes.
//!
//! A source serves absolute-offset chunk reads. It may return fewer bytes
//! than requested only when the end of the underlying data is reached; the
//! reader treats any short chunk as end of stream.
//!
//! - [`MemorySource`] - an in-memory `Bytes` value (zero-copy slices)
//! - [`FileSource`] - a `tokio::fs::File`, seeked per chunk
//! - [`StreamSource`] - any sequential `AsyncRead` such as a socket
//!
//! [`BufferedReader`]: crate::reader::BufferedReader

mod file;
mod memory;
mod stream;

use std::future::Future;

use bytes::Bytes;

/// Upper bound on what a source reserves before any bytes arrive.
///
/// Requested lengths can be far larger than the data behind them; buffers
/// grow past this only as bytes are actually read.
pub(crate) const MAX_PREALLOCATION: usize = 512 * 1024;

pub use file::FileSource;
pub use memory::MemorySource;
pub use stream::StreamSource;

/// Chunked, offset-addressed read primitive.
pub trait ReadableSource {
    /// Source-defined failure, surfaced to reader callers untouched.
    type Error;

    /// Read up to `length` bytes starting at absolute `offset`.
    ///
    /// Must return exactly `length` bytes unless the data ends first.
    fn read_chunk(
        &mut self,
        offset: u64,
        length: usize,
    ) -> impl Future<Output = Result<Bytes, Self::Error>> + Send;
}
