//! Sequential source over any `AsyncRead`.
//!
//! Sockets and pipes cannot seek. Offsets must therefore never move
//! backwards; a forward gap (left by a discard on the reader) is skipped by
//! reading and throwing the bytes away.

use std::future::Future;
use std::io::{Error, ErrorKind};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{ReadableSource, MAX_PREALLOCATION};

/// Source adapting a forward-only byte stream.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    position: u64,
}

impl<R> StreamSource<R> {
    /// Wrap a stream positioned at offset zero.
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    /// Number of bytes consumed from the stream so far.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Unwrap the stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> ReadableSource for StreamSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    type Error = std::io::Error;

    fn read_chunk(
        &mut self,
        offset: u64,
        length: usize,
    ) -> impl Future<Output = Result<Bytes, Self::Error>> + Send {
        async move {
            if offset < self.position {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!(
                        "stream source cannot rewind from {} to {}",
                        self.position, offset
                    ),
                ));
            }

            let gap = offset - self.position;
            if gap > 0 {
                let skipped =
                    tokio::io::copy(&mut (&mut self.inner).take(gap), &mut tokio::io::sink())
                        .await?;
                self.position += skipped;
                if skipped < gap {
                    return Ok(Bytes::new());
                }
            }

            // Streams return whatever is available; keep reading until the
            // chunk is full or the peer closes.
            let mut buf = BytesMut::with_capacity(length.min(MAX_PREALLOCATION));
            while buf.len() < length {
                if buf.len() == buf.capacity() {
                    buf.reserve((length - buf.len()).min(MAX_PREALLOCATION));
                }
                let n = (&mut self.inner)
                    .take((length - buf.len()) as u64)
                    .read_buf(&mut buf)
                    .await?;
                if n == 0 {
                    break;
                }
            }
            self.position += buf.len() as u64;

            Ok(buf.freeze())
        }
    }
}
