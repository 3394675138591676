//! In-memory source backed by `bytes::Bytes`.

use std::convert::Infallible;
use std::future::{ready, Future};

use bytes::Bytes;

use super::ReadableSource;

/// Source over a fixed byte buffer.
///
/// Chunks are slices of the original allocation, so no bytes are copied.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    /// Create a source over `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Total length of the data.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the source holds no data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ReadableSource for MemorySource {
    type Error = Infallible;

    fn read_chunk(
        &mut self,
        offset: u64,
        length: usize,
    ) -> impl Future<Output = Result<Bytes, Self::Error>> + Send {
        let len = self.data.len();
        let start = usize::try_from(offset).map_or(len, |o| o.min(len));
        let end = start.saturating_add(length).min(len);
        ready(Ok(self.data.slice(start..end)))
    }
}
