//! Row accessors over the tabular span schema.

use crate::cell::CellValue;
use crate::columns;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a span export table.
///
/// A row is a sparse mapping from column name to cell; `get` returns `None`
/// for absent columns so extractors can degrade instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanRow {
    cells: BTreeMap<String, CellValue>,
}

impl SpanRow {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a cell, replacing any previous value.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(column.into(), value.into());
        self
    }

    /// Inserts a cell.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(column.into(), value.into());
    }

    /// Gets a cell by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    /// Gets a non-blank string cell by column name.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .filter(|cell| !cell.is_blank())
            .and_then(CellValue::as_str)
    }

    /// Gets a numeric cell by column name, converting where lossless.
    #[must_use]
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.cells.get(column).and_then(CellValue::as_f64)
    }

    /// Parses a timestamp column as RFC 3339.
    #[must_use]
    pub fn get_timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        let raw = self.get_str(column)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// The trace this row belongs to, if identified.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.get_str(columns::TRACE_ID)
    }

    /// The span identifier, if present.
    #[must_use]
    pub fn span_id(&self) -> Option<&str> {
        self.get_str(columns::SPAN_ID)
    }

    /// The operation name, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.get_str(columns::NAME)
    }

    /// Returns true if this row has no parent span (root of its trace).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.get_str(columns::PARENT_ID).is_none()
    }

    /// Returns true if the row's status code is ERROR.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.get_str(columns::STATUS_CODE) == Some(columns::STATUS_ERROR)
    }

    /// Iterates over all (column, cell) pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// One row of an annotation table: an eval score attached to a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRow {
    /// The span this annotation scores.
    pub span_id: String,
    /// Annotation name (e.g. `"answer_quality"`, `"grounding_check"`).
    pub name: String,
    /// Score in [0, 1].
    pub score: f64,
}

impl AnnotationRow {
    /// Creates a new annotation row.
    #[must_use]
    pub fn new(span_id: impl Into<String>, name: impl Into<String>, score: f64) -> Self {
        Self {
            span_id: span_id.into(),
            name: name.into(),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_accessors() {
        let row = SpanRow::new()
            .with(columns::TRACE_ID, "t-1")
            .with(columns::SPAN_ID, "s-1")
            .with(columns::NAME, "search_tool")
            .with(columns::LATENCY_MS, 125.0)
            .with(columns::STATUS_CODE, "ERROR");

        assert_eq!(row.trace_id(), Some("t-1"));
        assert_eq!(row.span_id(), Some("s-1"));
        assert_eq!(row.name(), Some("search_tool"));
        assert_eq!(row.get_f64(columns::LATENCY_MS), Some(125.0));
        assert!(row.is_error());
        assert!(row.is_root());
    }

    #[test]
    fn blank_parent_counts_as_root() {
        let row = SpanRow::new().with(columns::PARENT_ID, "");
        assert!(row.is_root());

        let child = SpanRow::new().with(columns::PARENT_ID, "s-0");
        assert!(!child.is_root());
    }

    #[test]
    fn timestamp_parsing() {
        let row = SpanRow::new().with(columns::START_TIME, "2026-03-01T12:00:00Z");
        let ts = row.get_timestamp(columns::START_TIME).unwrap();
        assert_eq!(ts.timestamp(), 1_772_366_400);

        let bad = SpanRow::new().with(columns::START_TIME, "yesterday");
        assert!(bad.get_timestamp(columns::START_TIME).is_none());
    }

    #[test]
    fn missing_columns_are_none() {
        let row = SpanRow::new();
        assert!(row.get("anything").is_none());
        assert!(row.trace_id().is_none());
        assert!(row.get_f64(columns::LATENCY_MS).is_none());
    }
}
