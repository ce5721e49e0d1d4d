//! Trace store capability and built-in implementations.
//!
//! The discovery pipeline consumes spans and annotations through the
//! `TraceStore` trait; where the rows actually live (files, a collector
//! backend, a test fixture) is the implementation's business.

use crate::error::{Error, Result};
use crate::ingestor::IngestorRegistry;
use crate::row::AnnotationRow;
use crate::table::{AnnotationTable, SpanTable};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read access to span and annotation tables for a project.
#[async_trait]
pub trait TraceStore: Send + Sync {
    /// Fetches up to `limit` span rows for the project.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing data cannot be read or parsed.
    async fn fetch_spans(&self, project: &str, limit: usize) -> Result<SpanTable>;

    /// Fetches the annotation table for the project, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error when annotation data exists but cannot be read.
    async fn fetch_annotations(&self, project: &str) -> Result<Option<AnnotationTable>>;
}

/// A trace store over per-project export files.
///
/// Layout: `<root>/<project>/spans.{json,csv}` and optionally
/// `<root>/<project>/annotations.{json,csv}`.
pub struct FileStore {
    root: PathBuf,
    registry: IngestorRegistry,
}

impl FileStore {
    /// Creates a file store rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry: IngestorRegistry::new(),
        }
    }

    /// Finds the first existing candidate file under the project directory.
    fn find_file(&self, project: &str, stems: &[&str]) -> Option<PathBuf> {
        let dir = self.root.join(project);
        stems.iter().map(|stem| dir.join(stem)).find(|p| p.exists())
    }
}

#[async_trait]
impl TraceStore for FileStore {
    async fn fetch_spans(&self, project: &str, limit: usize) -> Result<SpanTable> {
        let path = self
            .find_file(project, &["spans.json", "spans.csv"])
            .ok_or_else(|| {
                Error::FetchFailed(format!(
                    "no spans file for project {project} under {}",
                    self.root.display()
                ))
            })?;

        debug!("Reading spans from {}", path.display());
        let data = std::fs::read(&path)?;
        let table = self.registry.ingest(&data, content_type_for(&path))?;

        Ok(table.iter().take(limit).cloned().collect())
    }

    async fn fetch_annotations(&self, project: &str) -> Result<Option<AnnotationTable>> {
        let Some(path) = self.find_file(project, &["annotations.json", "annotations.csv"]) else {
            return Ok(None);
        };

        debug!("Reading annotations from {}", path.display());
        let data = std::fs::read(&path)?;
        parse_annotations(&data, content_type_for(&path)).map(Some)
    }
}

/// An in-memory trace store, preloaded with tables.
///
/// Primarily a test double, also useful for embedding the pipeline in a
/// host that already holds the rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    spans: SpanTable,
    annotations: Option<AnnotationTable>,
}

impl MemoryStore {
    /// Creates a store serving the given tables for every project.
    #[must_use]
    pub fn new(spans: SpanTable, annotations: Option<AnnotationTable>) -> Self {
        Self { spans, annotations }
    }
}

#[async_trait]
impl TraceStore for MemoryStore {
    async fn fetch_spans(&self, _project: &str, limit: usize) -> Result<SpanTable> {
        Ok(self.spans.iter().take(limit).cloned().collect())
    }

    async fn fetch_annotations(&self, _project: &str) -> Result<Option<AnnotationTable>> {
        Ok(self.annotations.clone())
    }
}

/// Maps a file extension to a content-type hint for the registry.
fn content_type_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Some("application/json"),
        Some("csv") => Some("text/csv"),
        _ => None,
    }
}

/// Parses an annotation table from JSON or CSV bytes.
fn parse_annotations(data: &[u8], content_type: Option<&str>) -> Result<AnnotationTable> {
    if content_type == Some("text/csv") {
        let mut reader = csv::Reader::from_reader(data);
        let mut table = AnnotationTable::new();
        for record in reader.deserialize::<AnnotationRow>() {
            table.push(record.map_err(|e| Error::parse("csv", e.to_string()))?);
        }
        return Ok(table);
    }

    let rows: Vec<AnnotationRow> =
        serde_json::from_slice(data).map_err(|e| Error::parse("json", e.to_string()))?;
    Ok(rows.into_iter().collect())
}
