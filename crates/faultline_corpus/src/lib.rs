//! Tabular span corpus for Faultline.
//!
//! This crate provides:
//! - The wide-table span/annotation data model with row accessors
//! - Span ingestion from JSON and CSV exports with auto-detection
//! - The `TraceStore` capability consumed by the discovery pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use faultline_corpus::{IngestorRegistry, SpanTable};
//!
//! let registry = IngestorRegistry::new();
//! let table = registry.ingest(data, Some("application/json"))?;
//! for trace_id in table.unique_trace_ids() {
//!     let rows = table.rows_for_trace(&trace_id);
//! }
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]

pub mod cell;
pub mod columns;
pub mod error;
pub mod ingestor;
pub mod row;
pub mod store;
pub mod table;

pub use cell::CellValue;
pub use error::{Error, Result};
pub use ingestor::IngestorRegistry;
pub use row::{AnnotationRow, SpanRow};
pub use store::{FileStore, MemoryStore, TraceStore};
pub use table::{AnnotationTable, SpanTable};
