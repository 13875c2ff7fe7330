//! Error types for the signaling client

use rendezvous_protocol::ParseError;
use thiserror::Error;

/// Errors reported by a [`crate::SignalingChannel`]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// An inbound frame failed validation; the frame is dropped and the
    /// channel keeps listening
    #[error("Invalid frame: {0}")]
    Parse(#[from] ParseError),

    /// The underlying connection failed or could not be established; the
    /// channel is closed
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    /// `send` was called while the channel was not active
    #[error("Channel is not active")]
    ChannelNotActive,

    /// The endpoint URL cannot address a channel
    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Failures of the duplex transport under a channel
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The remote end refused the connection
    #[error("Connection refused: {0}")]
    Refused(String),

    /// The connection is already closed
    #[error("Connection closed")]
    Closed,
}

/// Errors from session directory requests
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The directory URL could not be built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors loading a [`crate::ClientConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the config file failed
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured base URL is not a valid URL
    #[error("Invalid base URL: {0}")]
    Url(#[from] url::ParseError),
}
