//! Pluggable span ingestion framework.
//!
//! Span exports arrive in different serializations of the same wide table.
//! This module provides a trait-based abstraction for parsing them, with
//! format auto-detection over a priority-ordered registry.

mod csv;
mod json;

pub use self::csv::CsvIngestor;
pub use self::json::JsonIngestor;

use crate::error::{Error, Result};
use crate::table::SpanTable;

/// A trait for ingesting span tables from a specific format.
pub trait SpanIngestor: Send + Sync {
    /// Returns the name of this format (e.g. "json", "csv").
    fn format_name(&self) -> &'static str;

    /// Checks if this ingestor can handle the given data.
    ///
    /// Uses header bytes and optional content-type to determine compatibility.
    fn can_handle(&self, header: &[u8], content_type: Option<&str>) -> bool;

    /// Ingests span data into a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be parsed.
    fn ingest(&self, data: &[u8]) -> Result<SpanTable>;
}

/// Registry of available span ingestors.
pub struct IngestorRegistry {
    ingestors: Vec<Box<dyn SpanIngestor>>,
}

impl Default for IngestorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestorRegistry {
    /// Creates a new registry with all built-in ingestors.
    ///
    /// Ingestors are registered most-specific first: JSON (structural
    /// detection) before CSV (textual fallback).
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            ingestors: Vec::new(),
        };
        registry.register(Box::new(JsonIngestor));
        registry.register(Box::new(CsvIngestor));
        registry
    }

    /// Registers an additional ingestor at the end of the priority list.
    pub fn register(&mut self, ingestor: Box<dyn SpanIngestor>) {
        self.ingestors.push(ingestor);
    }

    /// Ingests span data with auto-detection.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownFormat` if no ingestor recognizes the data, or
    /// the parse error of the matching ingestor.
    pub fn ingest(&self, data: &[u8], content_type: Option<&str>) -> Result<SpanTable> {
        if data.is_empty() {
            return Ok(SpanTable::new());
        }

        let header_len = data.len().min(256);
        let header = &data[..header_len];

        for ingestor in &self.ingestors {
            if ingestor.can_handle(header, content_type) {
                return ingestor.ingest(data);
            }
        }

        Err(Error::UnknownFormat)
    }
}

/// Trims leading whitespace bytes from a slice.
fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|byte| !byte.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}
