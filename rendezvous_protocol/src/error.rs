//! Validation errors for inbound frames

use thiserror::Error;

/// Reasons a frame is rejected by [`crate::validate_and_parse`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not UTF-8, or not syntactically valid JSON
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// No non-empty `type` field
    #[error("Missing message type")]
    MissingDiscriminator,

    /// A field required by the message type is absent or has the wrong shape
    #[error("Invalid field: {0}")]
    InvalidField(&'static str),

    /// The `type` field names no known message
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),
}

/// A value that cannot appear in a well-formed message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidValue {
    #[error("Peer id is empty")]
    EmptyPeerId,

    /// null, false, 0 or ""
    #[error("Session description is empty")]
    EmptyDescription,

    #[error("ICE candidate is null")]
    NullCandidate,
}
