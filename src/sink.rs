//! Byte sinks that accept framed output.
//!
//! The encoder never touches a transport directly; it hands finished byte
//! runs to a [`Sink`] together with an optional [`WritePromise`]. A sink must
//! resolve promises in the order the writes were submitted.

use bytes::{Bytes, BytesMut};

use crate::promise::WritePromise;

/// Destination for encoded bytes.
pub trait Sink {
    /// Queue `data` for the transport.
    ///
    /// `data` may be empty; such writes exist only to order a promise behind
    /// earlier writes and must still be acknowledged in sequence.
    fn write(&mut self, data: Bytes, promise: Option<WritePromise>);
}

impl<S: Sink + ?Sized> Sink for &mut S {
    #[inline]
    fn write(&mut self, data: Bytes, promise: Option<WritePromise>) {
        (**self).write(data, promise)
    }
}

/// In-memory sink: appends and acknowledges immediately.
impl Sink for BytesMut {
    fn write(&mut self, data: Bytes, promise: Option<WritePromise>) {
        self.extend_from_slice(&data);
        if let Some(promise) = promise {
            promise.succeed();
        }
    }
}
