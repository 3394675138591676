//! Write completion handles.
//!
//! A [`WritePromise`] travels with a write down to the sink, which resolves it
//! once the bytes are handed to the transport. The caller keeps the matching
//! [`WriteFuture`] and awaits it for backpressure.
//!
//! When the encoder splits one caller write into several sink writes, the
//! caller's promise is fanned out with [`WritePromise::fan_out`]. The children
//! form a counting join: the parent resolves exactly once, after every child
//! has resolved, carrying the first failure any child reported.
//!
//! # Example
//!
//! ```
//! use framewire::promise::write_promise;
//!
//! let (promise, mut future) = write_promise();
//! let [a, b] = promise.fan_out_array::<2>();
//!
//! a.succeed();
//! assert!(future.try_result().is_none());
//! b.succeed();
//! assert!(matches!(future.try_result(), Some(Ok(()))));
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{FramewireError, Result};

/// Create a connected promise/future pair.
pub fn write_promise() -> (WritePromise, WriteFuture) {
    let (tx, rx) = oneshot::channel();
    (
        WritePromise {
            target: Some(Target::Channel(tx)),
        },
        WriteFuture { rx },
    )
}

/// Where a resolution goes.
enum Target {
    /// Straight to a waiting [`WriteFuture`].
    Channel(oneshot::Sender<Result<()>>),
    /// Into a join shared with sibling promises.
    Joined(Arc<Join>),
}

/// Caller-side completion handle for a single write.
///
/// Resolving consumes the promise, so it can fire at most once. Dropping an
/// unresolved promise resolves it with [`FramewireError::PromiseDropped`].
pub struct WritePromise {
    target: Option<Target>,
}

impl WritePromise {
    /// Mark the write as handed to the transport.
    #[inline]
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// Mark the write as failed.
    #[inline]
    pub fn fail(self, error: FramewireError) {
        self.complete(Err(error));
    }

    /// Resolve with an explicit result.
    pub fn complete(mut self, result: Result<()>) {
        if let Some(target) = self.target.take() {
            resolve(target, result);
        }
    }

    /// Split this promise into `n` child promises joined back into it.
    ///
    /// The parent resolves after all `n` children resolve. If any child
    /// fails, the parent observes the first failure; later outcomes only
    /// count down. `n == 0` resolves the parent immediately with success.
    pub fn fan_out(mut self, n: usize) -> Vec<WritePromise> {
        let Some(target) = self.target.take() else {
            return Vec::new();
        };
        if n == 0 {
            resolve(target, Ok(()));
            return Vec::new();
        }

        let join = Arc::new(Join {
            state: Mutex::new(JoinState {
                remaining: n,
                failure: None,
                parent: Some(WritePromise {
                    target: Some(target),
                }),
            }),
        });

        (0..n)
            .map(|_| WritePromise {
                target: Some(Target::Joined(join.clone())),
            })
            .collect()
    }

    /// Like [`fan_out`](Self::fan_out) with a compile-time count.
    pub fn fan_out_array<const N: usize>(self) -> [WritePromise; N] {
        let mut children = self.fan_out(N).into_iter();
        std::array::from_fn(|_| match children.next() {
            Some(child) => child,
            // fan_out only returns fewer than N children for N == 0
            None => WritePromise { target: None },
        })
    }
}

impl Drop for WritePromise {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            resolve(target, Err(FramewireError::PromiseDropped));
        }
    }
}

impl std::fmt::Debug for WritePromise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.target {
            Some(Target::Channel(_)) => "channel",
            Some(Target::Joined(_)) => "joined",
            None => "resolved",
        };
        f.debug_struct("WritePromise").field("target", &kind).finish()
    }
}

fn resolve(target: Target, result: Result<()>) {
    match target {
        // The waiter may have given up; nothing to report to.
        Target::Channel(tx) => {
            let _ = tx.send(result);
        }
        Target::Joined(join) => join.arrive(result),
    }
}

/// Counting join shared by the children of one fanned-out promise.
struct Join {
    state: Mutex<JoinState>,
}

struct JoinState {
    remaining: usize,
    failure: Option<FramewireError>,
    parent: Option<WritePromise>,
}

impl Join {
    fn arrive(&self, result: Result<()>) {
        let fired = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = result {
                if state.failure.is_none() {
                    state.failure = Some(e);
                }
            }
            state.remaining = state.remaining.saturating_sub(1);
            if state.remaining == 0 {
                let failure = state.failure.take();
                state.parent.take().map(|parent| (parent, failure))
            } else {
                None
            }
        };

        // Resolve outside the lock: the parent may itself be a joined child.
        if let Some((parent, failure)) = fired {
            match failure {
                Some(e) => parent.fail(e),
                None => parent.succeed(),
            }
        }
    }
}

/// Awaitable side of a [`WritePromise`].
#[derive(Debug)]
pub struct WriteFuture {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteFuture {
    /// Check for a resolution without waiting.
    ///
    /// Returns `None` while the promise is still outstanding.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(FramewireError::PromiseDropped)),
        }
    }
}

impl Future for WriteFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(FramewireError::PromiseDropped)))
    }
}
