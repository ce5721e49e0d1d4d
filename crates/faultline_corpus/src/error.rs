//! Error types for corpus operations.

use thiserror::Error;

/// Errors that can occur during corpus operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to parse span data in a specific format.
    #[error("failed to parse {format} data: {message}")]
    Parse {
        /// The format that was being parsed.
        format: &'static str,
        /// What went wrong.
        message: String,
    },

    /// No registered ingestor recognized the data.
    #[error("unknown span data format")]
    UnknownFormat,

    /// The trace store could not serve the request.
    #[error("trace store fetch failed: {0}")]
    FetchFailed(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a parse error for the given format.
    #[must_use]
    pub fn parse(format: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            message: message.into(),
        }
    }
}

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, Error>;
