//! Span and annotation table containers.

use crate::columns;
use crate::row::{AnnotationRow, SpanRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered collection of span rows.
///
/// Row order is the ingestion order and is observable: trace partitions and
/// unique-ID enumeration are both stable with respect to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanTable {
    rows: Vec<SpanRow>,
}

impl SpanTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row to the end of the table.
    pub fn push(&mut self, row: SpanRow) {
        self.rows.push(row);
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over rows in ingestion order.
    pub fn iter(&self) -> impl Iterator<Item = &SpanRow> {
        self.rows.iter()
    }

    /// Returns the rows belonging to one trace, in ingestion order.
    #[must_use]
    pub fn rows_for_trace(&self, trace_id: &str) -> Vec<&SpanRow> {
        self.rows
            .iter()
            .filter(|row| row.trace_id() == Some(trace_id))
            .collect()
    }

    /// Returns unique trace IDs in first-seen order.
    #[must_use]
    pub fn unique_trace_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for row in &self.rows {
            if let Some(id) = row.trace_id() {
                if seen.insert(id.to_string()) {
                    ids.push(id.to_string());
                }
            }
        }
        ids
    }

    /// Returns the span-ID set of one trace.
    #[must_use]
    pub fn span_ids_for_trace(&self, trace_id: &str) -> HashSet<String> {
        self.rows_for_trace(trace_id)
            .into_iter()
            .filter_map(|row| row.span_id().map(ToString::to_string))
            .collect()
    }

    /// Returns the `(earliest, latest)` start timestamps across all rows.
    ///
    /// `None` when no row carries a parseable start time.
    #[must_use]
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut range: Option<(DateTime<Utc>, DateTime<Utc>)> = None;
        for row in &self.rows {
            if let Some(ts) = row.get_timestamp(columns::START_TIME) {
                range = Some(match range {
                    Some((min, max)) => (min.min(ts), max.max(ts)),
                    None => (ts, ts),
                });
            }
        }
        range
    }
}

impl FromIterator<SpanRow> for SpanTable {
    fn from_iter<I: IntoIterator<Item = SpanRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// A collection of annotation rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTable {
    rows: Vec<AnnotationRow>,
}

impl AnnotationTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row.
    pub fn push(&mut self, row: AnnotationRow) {
        self.rows.push(row);
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates over rows in ingestion order.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationRow> {
        self.rows.iter()
    }

    /// Returns annotations attached to any span in the given set, in order.
    #[must_use]
    pub fn for_spans(&self, span_ids: &HashSet<String>) -> Vec<&AnnotationRow> {
        self.rows
            .iter()
            .filter(|row| span_ids.contains(&row.span_id))
            .collect()
    }
}

impl FromIterator<AnnotationRow> for AnnotationTable {
    fn from_iter<I: IntoIterator<Item = AnnotationRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
