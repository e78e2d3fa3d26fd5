//! Main crate error.

use std::num::ParseIntError;

/// Main error enum.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// A required field was absent from an inbound frame.
    #[error("missing `{0}` from message")]
    MissingField(&'static str),
    /// The socket.io handshake reply could not be parsed.
    #[error("bad socket.io handshake reply: `{0}`")]
    Handshake(String),
    /// The API key or secret does not have the expected shape.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    /// An authenticated REST call came back without `result == "success"`.
    #[error("call failed: {0}")]
    CallFailed(String),
    /// Serde JSON processing failed.
    #[error("serde_json error occurred")]
    SerdeJson(#[from] serde_json::Error),
    /// Parse number error.
    #[error("failed to parse number")]
    ParseNumber,
    /// The outbound frame queue is gone (client shut down).
    #[error("failed to queue websocket message")]
    WebsocketSend,
}

impl From<ParseIntError> for ApiError {
    fn from(_value: ParseIntError) -> Self {
        ApiError::ParseNumber
    }
}
