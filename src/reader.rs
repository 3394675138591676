//! Buffered reader over a chunked readable source.
//!
//! Bytes move from the source in capacity-sized fetches into an internal
//! cache, then out through bounded reads, predicate-bounded reads and
//! discards. Each call issues at most one outstanding fetch at a time and
//! never re-fetches a byte.
//!
//! # Example
//!
//! ```
//! use framewire::reader::BufferedReader;
//! use framewire::source::MemorySource;
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let source = MemorySource::new(&b"GET /index.html HTTP/1.1\r\n"[..]);
//! let mut reader = BufferedReader::new(source, 8).unwrap();
//!
//! let method = reader.read_while(|b| b != b' ').await.unwrap();
//! assert_eq!(&method[..], b"GET");
//!
//! reader.discard(1);
//! let path = reader.read_while(|b| b != b' ').await.unwrap();
//! assert_eq!(&path[..], b"/index.html");
//! # });
//! ```

use std::mem;

use bytes::{Buf, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{FramewireError, Result};
use crate::source::ReadableSource;

/// Default fetch size (512 KiB).
pub const DEFAULT_CAPACITY: usize = 512 * 1024;

/// Configuration for [`BufferedReader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Minimum fetch size and steady-state buffering target.
    pub capacity: usize,
    /// After a read larger than `capacity`, copy the leftover bytes into
    /// their own allocation instead of pinning the oversized fetch buffer.
    pub shrink_oversized: bool,
}

impl ReaderConfig {
    /// Check the configuration before a reader is built.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FramewireError::InvalidCapacity);
        }
        Ok(())
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            shrink_oversized: true,
        }
    }
}

/// Reader that caches chunks fetched from a [`ReadableSource`].
///
/// Not safe for concurrent use: every method takes `&mut self`. If a fetch
/// future is dropped mid-flight the cache contents are unspecified and the
/// reader should be discarded.
#[derive(Debug)]
pub struct BufferedReader<S> {
    source: S,
    /// Fetched but not yet consumed bytes.
    cache: Bytes,
    /// Absolute source offset of the next fetch.
    offset: u64,
    /// Set once a fetch comes back short; never cleared.
    eof: bool,
    capacity: usize,
    shrink_oversized: bool,
}

impl<S> BufferedReader<S> {
    /// Create a reader with the given fetch capacity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCapacity` if `capacity` is zero.
    pub fn new(source: S, capacity: usize) -> Result<Self> {
        Self::with_config(
            source,
            ReaderConfig {
                capacity,
                ..ReaderConfig::default()
            },
        )
    }

    /// Create a reader from a full configuration.
    pub fn with_config(source: S, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            cache: Bytes::new(),
            offset: 0,
            eof: false,
            capacity: config.capacity,
            shrink_oversized: config.shrink_oversized,
        })
    }

    /// Start reading at absolute `offset` instead of zero.
    ///
    /// Cached bytes, if any, are dropped.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.cache = Bytes::new();
        self.offset = offset;
        self
    }

    /// Absolute source offset of the next fetch.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Absolute source offset of the next byte a read would return.
    #[inline]
    pub fn position(&self) -> u64 {
        self.offset - self.cache.len() as u64
    }

    /// Whether the source has reported end of stream.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Number of cached, unconsumed bytes.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.cache.len()
    }

    /// Configured fetch capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unwrap the source. Cached bytes are lost.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Discard up to `count` bytes without materializing them.
    ///
    /// Bytes beyond the cache are skipped by moving the fetch offset; they
    /// are never pulled through the source.
    pub fn discard(&mut self, count: usize) {
        if self.cache.len() >= count {
            self.cache.advance(count);
            return;
        }

        let shortfall = count - self.cache.len();
        self.cache.clear();
        self.offset = self.offset.saturating_add(shortfall as u64);
    }
}

impl<S: ReadableSource> BufferedReader<S> {
    /// Read up to `count` bytes.
    ///
    /// Served from the cache when it holds enough. Otherwise issues a single
    /// fetch of `(count - cached) + capacity` bytes and keeps the surplus.
    /// Returns fewer than `count` bytes only at end of stream.
    pub async fn read(&mut self, count: usize) -> std::result::Result<Bytes, S::Error> {
        if self.cache.len() >= count {
            return Ok(self.cache.split_to(count));
        }
        if self.eof {
            return Ok(mem::take(&mut self.cache));
        }

        let shortfall = count - self.cache.len();
        let chunk = self.fetch(shortfall.saturating_add(self.capacity)).await?;

        let cached = mem::take(&mut self.cache);
        let mut available = concat(vec![cached, chunk]);
        let result = available.split_to(count.min(available.len()));

        self.cache = if self.shrink_oversized && count > self.capacity && !available.is_empty() {
            Bytes::copy_from_slice(&available)
        } else {
            available
        };

        Ok(result)
    }

    /// Read the longest prefix whose bytes all satisfy `predicate`.
    ///
    /// The first failing byte stays in the reader and is the next byte
    /// returned. At end of stream everything matched so far is returned.
    pub async fn read_while<F>(&mut self, mut predicate: F) -> std::result::Result<Bytes, S::Error>
    where
        F: FnMut(u8) -> bool,
    {
        if let Some(end) = self.cache.iter().position(|&b| !predicate(b)) {
            return Ok(self.cache.split_to(end));
        }

        let mut matched = vec![mem::take(&mut self.cache)];
        while !self.eof {
            let chunk = match self.fetch(self.capacity).await {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Keep what was already pulled so a retry sees it again.
                    self.cache = concat(matched);
                    return Err(e);
                }
            };
            match chunk.iter().position(|&b| !predicate(b)) {
                Some(end) => {
                    matched.push(chunk.slice(..end));
                    self.cache = chunk.slice(end..);
                    break;
                }
                None => matched.push(chunk),
            }
        }

        Ok(concat(matched))
    }

    /// Discard the longest prefix whose bytes all satisfy `predicate`.
    ///
    /// Returns the number of bytes discarded.
    pub async fn discard_while<F>(&mut self, mut predicate: F) -> std::result::Result<u64, S::Error>
    where
        F: FnMut(u8) -> bool,
    {
        if let Some(end) = self.cache.iter().position(|&b| !predicate(b)) {
            self.cache.advance(end);
            return Ok(end as u64);
        }

        let mut discarded = self.cache.len() as u64;
        self.cache.clear();
        while !self.eof {
            let chunk = self.fetch(self.capacity).await?;
            match chunk.iter().position(|&b| !predicate(b)) {
                Some(end) => {
                    discarded += end as u64;
                    self.cache = chunk.slice(end..);
                    break;
                }
                None => discarded += chunk.len() as u64,
            }
        }

        Ok(discarded)
    }

    /// Read everything up to end of stream.
    pub async fn read_to_end(&mut self) -> std::result::Result<Bytes, S::Error> {
        let mut pieces = vec![mem::take(&mut self.cache)];
        while !self.eof {
            match self.fetch(self.capacity).await {
                Ok(chunk) => pieces.push(chunk),
                Err(e) => {
                    self.cache = concat(pieces);
                    return Err(e);
                }
            }
        }
        Ok(concat(pieces))
    }

    /// Fetch one chunk at the current offset and advance past it.
    async fn fetch(&mut self, length: usize) -> std::result::Result<Bytes, S::Error> {
        let chunk = self.source.read_chunk(self.offset, length).await?;
        tracing::trace!(
            offset = self.offset,
            requested = length,
            received = chunk.len(),
            "fetched chunk"
        );

        self.offset += chunk.len() as u64;
        if chunk.len() < length {
            tracing::debug!(offset = self.offset, "source reached end of stream");
            self.eof = true;
        }
        Ok(chunk)
    }
}

/// Join byte runs, copying only when more than one is non-empty.
fn concat(pieces: Vec<Bytes>) -> Bytes {
    let mut non_empty: Vec<Bytes> = pieces.into_iter().filter(|p| !p.is_empty()).collect();
    match non_empty.len() {
        0 => Bytes::new(),
        1 => non_empty.swap_remove(0),
        _ => {
            let total = non_empty.iter().map(Bytes::len).sum();
            let mut buf = BytesMut::with_capacity(total);
            for piece in &non_empty {
                buf.extend_from_slice(piece);
            }
            buf.freeze()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::future::{ready, Future};
    use std::sync::{Arc, Mutex};

    /// Memory source that records every fetch it serves.
    #[derive(Clone)]
    struct RecordingSource {
        inner: MemorySource,
        fetches: Arc<Mutex<Vec<(u64, usize)>>>,
    }

    impl RecordingSource {
        fn new(data: &'static [u8]) -> Self {
            Self {
                inner: MemorySource::new(data),
                fetches: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn fetches(&self) -> Vec<(u64, usize)> {
            self.fetches.lock().unwrap().clone()
        }
    }

    impl ReadableSource for RecordingSource {
        type Error = std::convert::Infallible;

        fn read_chunk(
            &mut self,
            offset: u64,
            length: usize,
        ) -> impl Future<Output = std::result::Result<Bytes, Self::Error>> + Send {
            self.fetches.lock().unwrap().push((offset, length));
            self.inner.read_chunk(offset, length)
        }
    }

    /// Source that always fails.
    struct BrokenSource;

    #[derive(Debug, PartialEq)]
    struct Broken;

    impl ReadableSource for BrokenSource {
        type Error = Broken;

        fn read_chunk(
            &mut self,
            _offset: u64,
            _length: usize,
        ) -> impl Future<Output = std::result::Result<Bytes, Self::Error>> + Send {
            ready(Err(Broken))
        }
    }

    /// Memory source whose fetch number `fail_at` fails once.
    struct FlakySource {
        data: Bytes,
        fetches: usize,
        fail_at: usize,
    }

    impl FlakySource {
        fn new(data: &'static [u8], fail_at: usize) -> Self {
            Self {
                data: Bytes::from_static(data),
                fetches: 0,
                fail_at,
            }
        }
    }

    impl ReadableSource for FlakySource {
        type Error = Broken;

        fn read_chunk(
            &mut self,
            offset: u64,
            length: usize,
        ) -> impl Future<Output = std::result::Result<Bytes, Self::Error>> + Send {
            let attempt = self.fetches;
            self.fetches += 1;

            let start = (offset as usize).min(self.data.len());
            let end = start.saturating_add(length).min(self.data.len());
            ready(if attempt == self.fail_at {
                Err(Broken)
            } else {
                Ok(self.data.slice(start..end))
            })
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = BufferedReader::new(MemorySource::default(), 0);
        assert!(matches!(result, Err(FramewireError::InvalidCapacity)));
    }

    #[test]
    fn test_config_default() {
        let config = ReaderConfig::default();
        assert_eq!(config.capacity, DEFAULT_CAPACITY);
        assert!(config.shrink_oversized);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let config: ReaderConfig = serde_json::from_str(r#"{"capacity": 4096}"#).unwrap();
        assert_eq!(config.capacity, 4096);
        assert!(config.shrink_oversized);

        let config: ReaderConfig = serde_json::from_str(r#"{"capacity": 0}"#).unwrap();
        assert!(matches!(config.validate(), Err(FramewireError::InvalidCapacity)));
    }

    #[tokio::test]
    async fn test_read_fetch_size() {
        let source = RecordingSource::new(b"abcdefghijklmnopqrstuvwxyz");
        let mut reader = BufferedReader::new(source.clone(), 4).unwrap();

        assert_eq!(&reader.read(3).await.unwrap()[..], b"abc");
        // 3 missing + 4 capacity
        assert_eq!(source.fetches(), vec![(0, 7)]);
        assert_eq!(reader.buffered(), 4);

        // Served from cache.
        assert_eq!(&reader.read(2).await.unwrap()[..], b"de");
        assert_eq!(source.fetches().len(), 1);

        // 2 cached, 4 missing + 4 capacity
        assert_eq!(&reader.read(6).await.unwrap()[..], b"fghijk");
        assert_eq!(source.fetches(), vec![(0, 7), (7, 8)]);
        assert_eq!(reader.offset(), 15);
        assert_eq!(reader.position(), 11);
    }

    #[tokio::test]
    async fn test_read_short_at_end() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"hello"[..]), 4).unwrap();

        assert_eq!(&reader.read(10).await.unwrap()[..], b"hello");
        assert!(reader.is_eof());
        assert!(reader.read(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_after_eof_does_not_fetch() {
        let source = RecordingSource::new(b"abc");
        let mut reader = BufferedReader::new(source.clone(), 8).unwrap();

        assert_eq!(&reader.read(1).await.unwrap()[..], b"a");
        assert!(reader.is_eof());
        assert_eq!(&reader.read(5).await.unwrap()[..], b"bc");
        assert_eq!(source.fetches().len(), 1);
    }

    #[tokio::test]
    async fn test_read_zero() {
        let source = RecordingSource::new(b"abc");
        let mut reader = BufferedReader::new(source.clone(), 8).unwrap();

        assert!(reader.read(0).await.unwrap().is_empty());
        assert!(source.fetches().is_empty());
    }

    #[tokio::test]
    async fn test_read_while_within_cache() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"aaab"[..]), 16).unwrap();
        reader.read(1).await.unwrap();

        assert_eq!(&reader.read_while(|b| b == b'a').await.unwrap()[..], b"aa");
        assert_eq!(&reader.read(1).await.unwrap()[..], b"b");
    }

    #[tokio::test]
    async fn test_read_while_across_chunks() {
        let source = RecordingSource::new(b"1234567890x123");
        let mut reader = BufferedReader::new(source.clone(), 3).unwrap();

        let digits = reader.read_while(|b| b.is_ascii_digit()).await.unwrap();
        assert_eq!(&digits[..], b"1234567890");
        assert_eq!(source.fetches(), vec![(0, 3), (3, 3), (6, 3), (9, 3)]);

        // The failing byte is next, with the chunk remainder cached.
        assert_eq!(reader.buffered(), 2);
        assert_eq!(&reader.read(1).await.unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn test_read_while_to_end() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"aaaaa"[..]), 2).unwrap();

        assert_eq!(&reader.read_while(|_| true).await.unwrap()[..], b"aaaaa");
        assert!(reader.is_eof());
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_read_while_zero_copy_single_chunk() {
        let data = Bytes::from_static(b"abc;def");
        let mut reader = BufferedReader::new(MemorySource::new(data.clone()), 16).unwrap();

        let head = reader.read_while(|b| b != b';').await.unwrap();
        assert_eq!(&head[..], b"abc");
        assert_eq!(head.as_ptr(), data.as_ptr());
    }

    #[tokio::test]
    async fn test_discard_within_cache() {
        let source = RecordingSource::new(b"abcdefgh");
        let mut reader = BufferedReader::new(source.clone(), 4).unwrap();

        reader.read(1).await.unwrap();
        reader.discard(2);
        assert_eq!(&reader.read(1).await.unwrap()[..], b"d");
        assert_eq!(source.fetches().len(), 1);
    }

    #[tokio::test]
    async fn test_discard_beyond_cache_skips_source() {
        let source = RecordingSource::new(b"abcdefghijklmnop");
        let mut reader = BufferedReader::new(source.clone(), 2).unwrap();

        reader.read(1).await.unwrap(); // caches "bc"
        reader.discard(10);
        assert_eq!(reader.offset(), 11);
        assert_eq!(source.fetches().len(), 1);

        assert_eq!(&reader.read(2).await.unwrap()[..], b"lm");
        assert_eq!(source.fetches(), vec![(0, 3), (11, 4)]);
    }

    #[tokio::test]
    async fn test_discard_while() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"     body"[..]), 2).unwrap();

        let skipped = reader.discard_while(|b| b == b' ').await.unwrap();
        assert_eq!(skipped, 5);
        assert_eq!(&reader.read(4).await.unwrap()[..], b"body");
    }

    #[tokio::test]
    async fn test_discard_while_in_cache() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"xxy"[..]), 8).unwrap();
        reader.read(1).await.unwrap();

        assert_eq!(reader.discard_while(|b| b == b'x').await.unwrap(), 1);
        assert_eq!(&reader.read(1).await.unwrap()[..], b"y");
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"0123456789"[..]), 3).unwrap();

        reader.read(2).await.unwrap();
        assert_eq!(&reader.read_to_end().await.unwrap()[..], b"23456789");
        assert!(reader.is_eof());
    }

    #[tokio::test]
    async fn test_starting_at() {
        let mut reader = BufferedReader::new(MemorySource::new(&b"0123456789"[..]), 4)
            .unwrap()
            .starting_at(6);

        assert_eq!(&reader.read(2).await.unwrap()[..], b"67");
    }

    #[tokio::test]
    async fn test_source_error_propagates() {
        let mut reader = BufferedReader::new(BrokenSource, 4).unwrap();

        assert_eq!(reader.read(1).await.unwrap_err(), Broken);
        assert_eq!(reader.read_while(|_| true).await.unwrap_err(), Broken);
        assert_eq!(reader.discard_while(|_| true).await.unwrap_err(), Broken);
        assert_eq!(reader.offset(), 0);
        assert!(!reader.is_eof());
    }

    #[tokio::test]
    async fn test_read_while_keeps_bytes_across_failed_fetch() {
        let mut reader = BufferedReader::new(FlakySource::new(b"aaaaaaaab", 1), 4).unwrap();

        assert_eq!(reader.read_while(|b| b == b'a').await.unwrap_err(), Broken);
        assert_eq!(reader.buffered(), 4);
        assert_eq!(reader.position(), 0);

        let run = reader.read_while(|b| b == b'a').await.unwrap();
        assert_eq!(&run[..], b"aaaaaaaa");
        assert_eq!(&reader.read(1).await.unwrap()[..], b"b");
    }

    #[tokio::test]
    async fn test_read_to_end_keeps_bytes_across_failed_fetch() {
        let mut reader = BufferedReader::new(FlakySource::new(b"0123456789", 1), 4).unwrap();

        assert_eq!(reader.read_to_end().await.unwrap_err(), Broken);
        assert_eq!(reader.buffered(), 4);

        assert_eq!(&reader.read_to_end().await.unwrap()[..], b"0123456789");
        assert!(reader.is_eof());
    }

    #[tokio::test]
    async fn test_oversized_read_shrinks_leftover() {
        let data = Bytes::from(vec![7u8; 64]);
        let mut reader = BufferedReader::new(MemorySource::new(data.clone()), 4).unwrap();

        let big = reader.read(20).await.unwrap();
        assert_eq!(big.len(), 20);
        assert_eq!(reader.buffered(), 4);

        // Leftover no longer points into the source allocation.
        let rest = reader.read(4).await.unwrap();
        let range = data.as_ptr() as usize..data.as_ptr() as usize + data.len();
        assert!(!range.contains(&(rest.as_ptr() as usize)));
    }

    #[tokio::test]
    async fn test_oversized_read_retained_when_configured() {
        let data = Bytes::from(vec![7u8; 64]);
        let config = ReaderConfig {
            capacity: 4,
            shrink_oversized: false,
        };
        let mut reader = BufferedReader::with_config(MemorySource::new(data.clone()), config).unwrap();

        reader.read(20).await.unwrap();
        let rest = reader.read(4).await.unwrap();
        assert_eq!(rest.as_ptr(), data[20..].as_ptr());
    }

    #[test]
    fn test_concat() {
        assert!(concat(vec![]).is_empty());
        assert_eq!(
            &concat(vec![Bytes::new(), Bytes::from_static(b"ab")])[..],
            b"ab"
        );
        assert_eq!(
            &concat(vec![Bytes::from_static(b"ab"), Bytes::from_static(b"cd")])[..],
            b"abcd"
        );
    }
}
