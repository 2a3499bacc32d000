//! Connector error types.

use thiserror::Error;

/// A frame that could not be turned into an envelope.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Malformed envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Failure opening or reading the underlying stream.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),
}

/// Errors surfaced to the connector's owner.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}
