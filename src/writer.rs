//! Dedicated writer task feeding encoded bytes to a transport.
//!
//! Encoders run synchronously and hand their output to a [`WriterHandle`],
//! which queues it for a tokio task owning the transport's write half. The
//! task batches queued writes into vectored I/O and resolves each write's
//! promise, in submission order, once its batch has been flushed.
//!
//! # Architecture
//!
//! ```text
//! Encoder ─► WriterHandle (Sink) ─► mpsc ─► Writer Task ─► AsyncWrite
//!                                               │
//!                              promises resolved in order after flush
//! ```
//!
//! Queued writes are never rejected for being over the backpressure limit;
//! a chunked body write is three sink writes and must reach the wire intact.
//! Producers observe backpressure through their promises or by awaiting
//! [`WriterHandle::ready`].

use std::io::IoSlice;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backpressure::{PendingWrites, DEFAULT_MAX_PENDING, DEFAULT_TIMEOUT};
use crate::error::{FramewireError, Result};
use crate::promise::WritePromise;
use crate::sink::Sink;

/// Maximum writes to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Bytes queued for the transport, with the promise to resolve once flushed.
#[derive(Debug)]
pub struct OutboundWrite {
    pub data: Bytes,
    pub promise: Option<WritePromise>,
}

impl OutboundWrite {
    /// Create a new outbound write.
    #[inline]
    pub fn new(data: Bytes, promise: Option<WritePromise>) -> Self {
        Self { data, promise }
    }

    /// Resolve the promise, if any.
    fn complete(self, result: Result<()>) {
        if let Some(promise) = self.promise {
            promise.complete(result);
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Queued-but-unflushed writes before backpressure kicks in.
    pub max_pending_writes: usize,
    /// Timeout when waiting for backpressure to clear.
    #[serde(with = "duration_millis")]
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_writes: DEFAULT_MAX_PENDING,
            backpressure_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Handle for queuing writes to the writer task.
///
/// This is cheaply cloneable and can be shared across encoders.
#[derive(Debug, Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<OutboundWrite>,
    pending: PendingWrites,
}

impl WriterHandle {
    /// Queue a write immediately.
    ///
    /// If the writer task is gone, the promise is failed with
    /// `ConnectionClosed` and the same error is returned.
    pub fn queue(&self, data: Bytes, promise: Option<WritePromise>) -> Result<()> {
        self.pending.add(1);
        self.tx
            .send(OutboundWrite::new(data, promise))
            .map_err(|rejected| {
                self.pending.remove(1);
                rejected.0.complete(Err(FramewireError::ConnectionClosed));
                FramewireError::ConnectionClosed
            })
    }

    /// Wait for backpressure to clear, then queue a write.
    pub async fn send(&self, data: Bytes, promise: Option<WritePromise>) -> Result<()> {
        if let Err(e) = self.ready().await {
            if let Some(promise) = promise {
                promise.fail(e.duplicate());
            }
            return Err(e);
        }
        self.queue(data, promise)
    }

    /// Wait until the number of pending writes drops below the limit.
    pub async fn ready(&self) -> Result<()> {
        self.pending.ready().await
    }

    /// Whether producers are ahead of the transport by `max_pending_writes`.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.is_saturated()
    }

    /// Get current pending write count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.queued()
    }

    /// Check whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Sink for WriterHandle {
    fn write(&mut self, data: Bytes, promise: Option<WritePromise>) {
        let has_promise = promise.is_some();
        if let Err(e) = self.queue(data, promise) {
            // With a promise the caller already has the error.
            if !has_promise {
                tracing::warn!("dropping write: {}", e);
            }
        }
    }
}

/// Spawn a task that owns `writer` and drains queued writes into it.
///
/// The task ends with `Ok(())` once every handle is dropped and the queue is
/// empty, or with the first transport error.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = PendingWrites::new(config.max_pending_writes, config.backpressure_timeout);

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - receives writes and flushes them to the transport.
async fn writer_loop<W>(
    mut rx: mpsc::UnboundedReceiver<OutboundWrite>,
    mut writer: W,
    pending: PendingWrites,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(w) => w,
            None => {
                // All handles dropped, clean shutdown
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(write) => batch.push(write),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        let result = write_batch(&mut writer, &batch).await;
        pending.remove(batch_size);

        match result {
            Ok(()) => {
                for write in batch {
                    write.complete(Ok(()));
                }
            }
            Err(e) => {
                tracing::error!("writer task failed: {}", e);
                for write in batch {
                    write.complete(Err(e.duplicate()));
                }

                // Nothing queued behind the failure can reach the wire.
                rx.close();
                while let Ok(write) = rx.try_recv() {
                    pending.remove(1);
                    write.complete(Err(FramewireError::ConnectionClosed));
                }
                return Err(e);
            }
        }
    }
}

/// Write a batch using scatter/gather I/O (write_vectored), then flush.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundWrite]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(|w| w.data.len()).sum();
    if total_size == 0 {
        writer.flush().await?;
        return Ok(());
    }

    let mut total_written = 0;
    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(FramewireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data remaining after `skip_bytes`.
fn build_remaining_slices(batch: &[OutboundWrite], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut skipped = 0;

    for write in batch {
        let start = skipped;
        let end = skipped + write.data.len();

        if !write.data.is_empty() && skip_bytes < end {
            let start_in_data = skip_bytes.saturating_sub(start);
            slices.push(IoSlice::new(&write.data[start_in_data..]));
        }
        skipped = end;
    }

    slices
}

/// Serde helper: `Duration` as integer milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
