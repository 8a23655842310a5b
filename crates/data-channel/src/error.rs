//! Error types for the side channel.

use std::io::ErrorKind;

/// Errors produced by side-channel transfers.
#[derive(Debug, thiserror::Error)]
pub enum DataChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    /// The peer closed the stream before a declared length was read.
    #[error("incomplete read: expected {expected} bytes, got {received}")]
    Incomplete { expected: usize, received: usize },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid frame header: {0}")]
    Json(#[from] serde_json::Error),
}

impl DataChannelError {
    /// Short read in the middle of a frame.
    pub fn is_partial_read(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }

    /// Failures worth retrying for store content: resets and short reads.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Incomplete { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
