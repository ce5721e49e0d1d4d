//! Error types for embedding operations.

use thiserror::Error;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum Error {
    /// API request failed.
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Rate limited.
    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Number of seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// Invalid API key.
    #[error("invalid API key")]
    InvalidApiKey,

    /// Response parsing failed.
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// The provider returned a vector of the wrong width.
    #[error("expected embedding of dimension {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },

    /// Embeddings are disabled for this run.
    #[error("embedding provider disabled")]
    Disabled,

    /// Network error.
    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

impl Error {
    /// Returns true if no amount of retrying this run will produce vectors.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disabled | Self::InvalidApiKey)
    }
}

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, Error>;
