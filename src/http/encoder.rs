//! Per-message encoder: head, body chunks, end.
//!
//! # Example
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use framewire::http::{Part, ResponseEncoder, ResponseHead, StatusCode};
//!
//! let mut encoder = ResponseEncoder::new();
//! let mut wire = BytesMut::new();
//!
//! encoder.encode(Part::Head(ResponseHead::new(StatusCode::OK)), None, &mut wire);
//! encoder.encode(Part::Body(Bytes::from_static(b"abc")), None, &mut wire);
//! encoder.encode(Part::End(None), None, &mut wire);
//!
//! assert_eq!(
//!     &wire[..],
//!     b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\n"
//! );
//! ```

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use http::header::TRANSFER_ENCODING;
use http::{HeaderMap, HeaderValue, Version};

use super::head::{self, MessageHead, RequestHead, ResponseHead};
use crate::error::FramewireError;
use crate::promise::WritePromise;
use crate::sink::Sink;

/// Default initial scratch buffer size.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 256;

const CRLF: &[u8] = b"\r\n";
const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// One piece of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part<H> {
    /// Start line and headers.
    Head(H),
    /// A body chunk, possibly empty.
    Body(Bytes),
    /// End of message, with optional trailers.
    End(Option<HeaderMap>),
}

/// Encoder input: a message part, or bytes that bypass framing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound<H> {
    Part(Part<H>),
    /// Forwarded to the sink unmodified.
    Raw(Bytes),
}

impl<H> From<Part<H>> for Outbound<H> {
    fn from(part: Part<H>) -> Self {
        Outbound::Part(part)
    }
}

impl<H> From<Bytes> for Outbound<H> {
    fn from(bytes: Bytes) -> Self {
        Outbound::Raw(bytes)
    }
}

/// Body framing, fixed once per message at the head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Body bytes are written as-is.
    FixedLength,
    /// Body bytes are wrapped in hex length-prefixed chunks.
    Chunked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingHead,
    InBody(Framing),
}

/// Configuration for [`HttpEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Initial size of the scratch buffer used for heads and chunk framing.
    pub scratch_capacity: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
        }
    }
}

/// Encoder for HTTP/1.1 responses.
pub type ResponseEncoder = HttpEncoder<ResponseHead>;

/// Encoder for HTTP/1.1 requests.
pub type RequestEncoder = HttpEncoder<RequestHead>;

/// State machine turning message parts into framed wire bytes.
///
/// Framing bytes are serialized into a single scratch buffer. Each
/// serialized run is split off and frozen before it reaches the sink, so the
/// sink owns what it was given while the scratch buffer keeps only spare
/// capacity; the allocation is reclaimed once the sink drops its bytes.
pub struct HttpEncoder<H> {
    state: State,
    scratch: BytesMut,
    _head: PhantomData<fn(H)>,
}

impl<H: MessageHead> HttpEncoder<H> {
    /// Create an encoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(EncoderConfig::default())
    }

    /// Create an encoder with custom configuration.
    pub fn with_config(config: EncoderConfig) -> Self {
        Self {
            state: State::AwaitingHead,
            scratch: BytesMut::with_capacity(config.scratch_capacity),
            _head: PhantomData,
        }
    }

    /// Framing of the message in progress, or `None` between messages.
    pub fn framing(&self) -> Option<Framing> {
        match self.state {
            State::AwaitingHead => None,
            State::InBody(framing) => Some(framing),
        }
    }

    /// Encode one outbound item into `sink`.
    ///
    /// `promise` resolves once every sink write the item turned into has
    /// been acknowledged. Items that arrive out of order fail the promise
    /// with [`FramewireError::Protocol`] and write nothing.
    pub fn encode(
        &mut self,
        item: impl Into<Outbound<H>>,
        promise: Option<WritePromise>,
        sink: &mut impl Sink,
    ) {
        match item.into() {
            Outbound::Part(Part::Head(head)) => self.write_head(head, promise, sink),
            Outbound::Part(Part::Body(chunk)) => self.write_body(chunk, promise, sink),
            Outbound::Part(Part::End(trailers)) => self.write_end(trailers, promise, sink),
            Outbound::Raw(bytes) => sink.write(bytes, promise),
        }
    }

    fn write_head(&mut self, mut msg: H, promise: Option<WritePromise>, sink: &mut impl Sink) {
        if let State::InBody(_) = self.state {
            reject(promise, "head received while a message body is in progress");
            return;
        }

        let framing = select_framing(&mut msg);
        tracing::debug!(?framing, "selected body framing");

        let headers = msg.headers();
        self.scratch.reserve(64 + head::encoded_len(headers));
        msg.write_start_line(&mut self.scratch);
        self.scratch.extend_from_slice(CRLF);
        head::write_headers(headers, &mut self.scratch);
        self.scratch.extend_from_slice(CRLF);

        self.state = State::InBody(framing);
        sink.write(self.hand_off(), promise);
    }

    /// Chunked bodies go out as three writes: the size line from the scratch
    /// buffer, the chunk itself, and the trailing CRLF as a static `Bytes`
    /// rather than a scratch copy. Fixed-length bodies are one write.
    fn write_body(&mut self, chunk: Bytes, promise: Option<WritePromise>, sink: &mut impl Sink) {
        match self.state {
            State::AwaitingHead => reject(promise, "body chunk received before a head"),
            State::InBody(Framing::FixedLength) => sink.write(chunk, promise),
            State::InBody(Framing::Chunked) => {
                let [size_promise, data_promise, crlf_promise] = match promise {
                    Some(promise) => promise.fan_out_array::<3>().map(Some),
                    None => [None, None, None],
                };

                self.scratch.reserve(18);
                put_chunk_size(&mut self.scratch, chunk.len());
                sink.write(self.hand_off(), size_promise);
                sink.write(chunk, data_promise);
                sink.write(Bytes::from_static(CRLF), crlf_promise);
            }
        }
    }

    fn write_end(
        &mut self,
        trailers: Option<HeaderMap>,
        promise: Option<WritePromise>,
        sink: &mut impl Sink,
    ) {
        match self.state {
            State::AwaitingHead => reject(promise, "end received before a head"),
            State::InBody(Framing::FixedLength) => {
                if trailers.as_ref().is_some_and(|t| !t.is_empty()) {
                    tracing::debug!("dropping trailers on a fixed-length message");
                }
                // An empty write keeps the promise ordered behind the body.
                if let Some(promise) = promise {
                    sink.write(Bytes::new(), Some(promise));
                }
                self.state = State::AwaitingHead;
            }
            State::InBody(Framing::Chunked) => {
                let trailers = trailers.unwrap_or_default();
                self.scratch.reserve(5 + head::encoded_len(&trailers));
                self.scratch.extend_from_slice(b"0\r\n");
                head::write_headers(&trailers, &mut self.scratch);
                self.scratch.extend_from_slice(CRLF);

                self.state = State::AwaitingHead;
                sink.write(self.hand_off(), promise);
            }
        }
    }

    /// Split the serialized run off the scratch buffer.
    fn hand_off(&mut self) -> Bytes {
        self.scratch.split().freeze()
    }
}

impl<H: MessageHead> Default for HttpEncoder<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> std::fmt::Debug for HttpEncoder<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEncoder")
            .field("state", &self.state)
            .field("scratch_capacity", &self.scratch.capacity())
            .finish()
    }
}

/// Choose the framing for a message and mark chunked heads.
///
/// An explicit chunked transfer coding wins. A declared length, a head that
/// cannot carry a body, or a pre-1.1 version (which has no chunked coding;
/// the body ends when the connection closes) means fixed length. Anything
/// else is chunked and gets a `transfer-encoding: chunked` header.
fn select_framing<H: MessageHead>(msg: &mut H) -> Framing {
    let headers = msg.headers();
    if head::is_chunked(headers) {
        return Framing::Chunked;
    }
    if head::has_content_length(headers) || !msg.permits_body() || msg.version() < Version::HTTP_11
    {
        return Framing::FixedLength;
    }

    msg.headers_mut()
        .append(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    Framing::Chunked
}

/// Append `<hex-length>\r\n`, lower-case, no leading zeros.
fn put_chunk_size(buf: &mut BytesMut, len: usize) {
    let mut digits = [0u8; 2 * std::mem::size_of::<usize>()];
    let mut start = digits.len();
    let mut n = len;
    loop {
        start -= 1;
        digits[start] = HEX_DIGITS[n & 0xf];
        n >>= 4;
        if n == 0 {
            break;
        }
    }
    buf.extend_from_slice(&digits[start..]);
    buf.extend_from_slice(CRLF);
}

fn reject(promise: Option<WritePromise>, reason: &str) {
    tracing::warn!("{}", reason);
    if let Some(promise) = promise {
        promise.fail(FramewireError::Protocol(reason.to_string()));
    }
}
