//! Error types of the control channel and the art facade.

use frameart_data_channel::DataChannelError;
use frameart_protocol::ProtocolError;
use tokio_tungstenite::tungstenite;

/// Errors opening or using the control channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("connection closed")]
    Closed,
}

/// Errors of a single request/response exchange.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("a request is already waiting on {0:?}")]
    KeyInUse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device error {}", code.as_deref().unwrap_or("unknown"))]
    Device { code: Option<String> },
}

/// Errors of composite art operations (transfers).
#[derive(Debug, thiserror::Error)]
pub enum ArtError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] DataChannelError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no thumbnail returned for {0}")]
    Empty(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArtError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Request(RequestError::Timeout) | Self::Transfer(DataChannelError::Timeout)
        )
    }

    /// Reset or short read on the side channel.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transfer(e) if e.is_retryable())
    }
}

/// Errors of the REST status probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(RequestError::Timeout.to_string(), "request timed out");
        assert_eq!(
            RequestError::Device { code: Some("-1".into()) }.to_string(),
            "device error -1"
        );
        assert_eq!(
            RequestError::Device { code: None }.to_string(),
            "device error unknown"
        );
        assert_eq!(
            RequestError::from(ChannelError::Closed).to_string(),
            "connection closed"
        );
    }

    #[test]
    fn timeout_classification() {
        assert!(ArtError::from(RequestError::Timeout).is_timeout());
        assert!(ArtError::from(DataChannelError::Timeout).is_timeout());
        assert!(!ArtError::from(RequestError::Cancelled).is_timeout());
        assert!(
            ArtError::from(DataChannelError::Incomplete { expected: 10, received: 2 })
                .is_retryable()
        );
    }
}
