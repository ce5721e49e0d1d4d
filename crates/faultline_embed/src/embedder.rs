//! The embedding capability.

use crate::error::{Error, Result};
use async_trait::async_trait;

/// Maximum number of characters submitted to a provider per request.
pub const MAX_INPUT_CHARS: usize = 8_000;

/// Produces dense vectors for text.
///
/// Implementations are expected to be deterministic per `(model, text)` so
/// that cached vectors are interchangeable with fresh ones.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The provider model identifier.
    fn model(&self) -> &str;

    /// The width of vectors this embedder produces.
    fn dimension(&self) -> usize;

    /// Embeds the given text.
    ///
    /// Implementations truncate input to [`MAX_INPUT_CHARS`] before
    /// submission.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider cannot produce a vector.
    async fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

/// An embedder that refuses every request.
///
/// Stands in when no provider is configured; callers treat the failure as
/// "run without embeddings".
#[derive(Debug, Clone)]
pub struct DisabledEmbedder {
    dimension: usize,
}

impl DisabledEmbedder {
    /// Creates a disabled embedder advertising the given dimension.
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for DisabledEmbedder {
    fn default() -> Self {
        Self::new(crate::client::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model(&self) -> &str {
        "disabled"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f64>> {
        Err(Error::Disabled)
    }
}

/// Truncates text to at most `max_chars` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
