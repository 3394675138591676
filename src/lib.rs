//! # framewire
//!
//! Streaming read buffering and HTTP/1.1 message framing for async
//! networking runtimes.
//!
//! ## Architecture
//!
//! - **Read side**: [`BufferedReader`] wraps a [`ReadableSource`] and serves
//!   bounded reads, predicate-bounded reads and discards from a cache filled
//!   by capacity-sized chunk fetches.
//! - **Write side**: [`HttpEncoder`] turns a head, body chunks and an end
//!   marker into fixed-length or chunked wire bytes and hands them to a
//!   [`Sink`] such as the [`WriterHandle`] of a writer task. A caller's
//!   [`WritePromise`] resolves only once every sink write it was split into
//!   has been acknowledged.
//!
//! ## Example
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use framewire::http::{Part, ResponseEncoder, ResponseHead, StatusCode};
//! use framewire::promise::write_promise;
//!
//! let mut encoder = ResponseEncoder::new();
//! let mut wire = BytesMut::new();
//! let (promise, mut done) = write_promise();
//!
//! encoder.encode(Part::Head(ResponseHead::new(StatusCode::OK)), None, &mut wire);
//! encoder.encode(Part::Body(Bytes::from_static(b"hi")), Some(promise), &mut wire);
//! encoder.encode(Part::End(None), None, &mut wire);
//!
//! assert!(matches!(done.try_result(), Some(Ok(()))));
//! assert!(wire.ends_with(b"2\r\nhi\r\n0\r\n\r\n"));
//! ```

pub mod error;
pub mod http;
pub mod promise;
pub mod reader;
pub mod sink;
pub mod source;
pub mod writer;

mod backpressure;

pub use error::{FramewireError, Result};
pub use http::{HttpEncoder, Part, RequestEncoder, ResponseEncoder};
pub use promise::{write_promise, WriteFuture, WritePromise};
pub use reader::{BufferedReader, ReaderConfig};
pub use sink::Sink;
pub use source::ReadableSource;
pub use writer::{spawn_writer_task, WriterConfig, WriterHandle};
