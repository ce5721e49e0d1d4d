//! Error types for the discovery pipeline.

use thiserror::Error;

/// Errors that can terminate a discovery run.
///
/// Recoverable conditions (failed embeddings, degenerate statistical tests,
/// too-small clustering inputs) never surface here; they degrade to neutral
/// values inside their stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Fewer traces than the configured minimum at one of the gates.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The clustering backend rejected its input.
    #[error("clustering failed: {0}")]
    Clustering(String),

    /// The trace store could not serve spans.
    #[error(transparent)]
    Store(#[from] faultline_corpus::Error),
}

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, Error>;
