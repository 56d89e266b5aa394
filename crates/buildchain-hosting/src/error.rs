//! Error types for buildchain-hosting

use thiserror::Error;

/// Errors that can occur while talking to a git hosting provider
#[derive(Error, Debug)]
pub enum HostingError {
    /// Every credential in the pool has been rate limited
    #[error("rate limit exhausted: all {tried} credential(s) were throttled")]
    RateLimitExhausted { tried: usize },

    /// Transport-level failure (DNS, TLS, connection reset, ...)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider answered with a status the client does not handle
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body could not be decoded
    #[error("failed to decode provider response: {0}")]
    Decode(String),

    /// The provider configuration is unusable
    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for HostingError {
    fn from(err: reqwest::Error) -> Self {
        HostingError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for HostingError {
    fn from(err: serde_json::Error) -> Self {
        HostingError::Decode(err.to_string())
    }
}
