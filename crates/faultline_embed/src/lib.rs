//! Embedding provider access for Faultline.
//!
//! This crate provides:
//! - The `Embedder` capability with an HTTP client and a disabled no-op
//! - A process-wide vector cache keyed by model and text prefix
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline_embed::{CachedEmbedder, Client, ClientConfig, Embedder};
//!
//! let client = Client::new(ClientConfig::new(api_key))?;
//! let embedder = CachedEmbedder::with_fresh_cache(client);
//! let vector = embedder.embed("some trace text").await?;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]

pub mod cache;
pub mod client;
pub mod embedder;
pub mod error;

pub use cache::{CachedEmbedder, EmbeddingCache};
pub use client::{Client, ClientConfig, DEFAULT_DIMENSION, DEFAULT_MODEL};
pub use embedder::{DisabledEmbedder, Embedder, MAX_INPUT_CHARS};
pub use error::{Error, Result};
