//! HTTP/1.1 message framing.
//!
//! Outbound messages arrive as a head, zero or more body chunks and an end
//! marker. The encoder chooses fixed-length or chunked framing once per
//! message, at the head, and serializes each part into wire bytes:
//!
//! ```text
//! head:    <start-line> CRLF *(<name>: <value> CRLF) CRLF
//! chunk:   <hex-length> CRLF <bytes> CRLF
//! end:     0 CRLF *(<trailer> CRLF) CRLF
//! ```
//!
//! Fixed-length bodies are written as-is with no framing bytes.

mod encoder;
mod head;

pub use encoder::{
    EncoderConfig, Framing, HttpEncoder, Outbound, Part, RequestEncoder, ResponseEncoder,
    DEFAULT_SCRATCH_CAPACITY,
};
pub use head::{MessageHead, RequestHead, ResponseHead};

pub use ::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
