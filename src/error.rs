//! Error types for proxyshim

use std::io;
use thiserror::Error;

/// Result type for proxyshim operations
pub type Result<T> = std::result::Result<T, ShimError>;

/// Errors that can occur while driving the test proxy
#[derive(Debug, Error)]
pub enum ShimError {
    /// Missing or invalid configuration, or a session used out of order
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The test proxy answered, but not the way the protocol requires
    #[error("Protocol error: {message}: {body}")]
    Protocol {
        /// What was expected
        message: String,
        /// Response body returned by the proxy, for diagnosis
        body: String,
    },

    /// Network or transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed JSON returned by the proxy
    #[error("Decoding error: {0}")]
    Decoding(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Outgoing request that cannot be rewritten
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ShimError {
    /// Build a protocol error from a message and a raw response body
    #[must_use]
    pub fn protocol(message: impl Into<String>, body: &[u8]) -> Self {
        Self::Protocol {
            message: message.into(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}
