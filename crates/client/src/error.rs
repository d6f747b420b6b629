//! Errors surfaced by the outbox, puller, and WS listener.

use crate::wire::ConflictDto;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("client is offline")]
    Offline,
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("stale base entry: {0:?}")]
    Conflict(ConflictDto),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ClientError::Offline
        } else {
            ClientError::Network(err.to_string())
        }
    }
}
