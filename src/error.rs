//! Error types for framewire.
//!
//! Readable-source failures are not represented here: [`BufferedReader`]
//! hands them back as the source's own error type, untouched.
//!
//! [`BufferedReader`]: crate::reader::BufferedReader

use thiserror::Error;

/// Main error type for configuration, encoding and sink operations.
#[derive(Debug, Error)]
pub enum FramewireError {
    /// I/O error while writing to the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reader capacity must be at least one byte.
    #[error("Invalid capacity: must be greater than zero")]
    InvalidCapacity,

    /// A message part arrived in a state that cannot accept it.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The writer task is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Pending writes did not drain below the limit in time.
    #[error("Backpressure timeout")]
    BackpressureTimeout,

    /// A completion handle was dropped before it was resolved.
    #[error("Write promise dropped without completion")]
    PromiseDropped,
}

impl FramewireError {
    /// Build an error of the same shape for another waiter.
    ///
    /// Used when one transport failure has to fail several promises.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::InvalidCapacity => Self::InvalidCapacity,
            Self::Protocol(msg) => Self::Protocol(msg.clone()),
            Self::ConnectionClosed => Self::ConnectionClosed,
            Self::BackpressureTimeout => Self::BackpressureTimeout,
            Self::PromiseDropped => Self::PromiseDropped,
        }
    }
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;
