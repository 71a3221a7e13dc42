//! Error types for the WAF synchronization layer.

use thiserror::Error;

/// Result type alias for synchronization operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by the snapshot client, stream consumer, poller and
/// mutation synchronizer
#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx HTTP response
    #[error("{status} {status_text}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Canonical reason phrase
        status_text: String,
        /// Raw response body
        body: String,
    },

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Live feed connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connect timeout
    #[error("Connection timed out")]
    Timeout,

    /// Malformed base URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A mutation for the same entity is already in flight
    #[error("Mutation already in progress for {0}")]
    MutationInProgress(String),
}

impl Error {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the error came from the server refusing the request rather
    /// than from the network path
    pub fn is_http(&self) -> bool {
        matches!(self, Error::Http { .. })
    }
}
