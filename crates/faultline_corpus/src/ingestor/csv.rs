//! CSV span ingestor.

use crate::error::{Error, Result};
use crate::ingestor::{trim_leading_whitespace, SpanIngestor};
use crate::row::SpanRow;
use crate::table::SpanTable;

/// Ingestor for CSV span exports.
///
/// The header row supplies column names. Every cell is stored as a string;
/// numeric consumers parse on access, so dtype inference can never mangle an
/// identifier column.
pub struct CsvIngestor;

impl SpanIngestor for CsvIngestor {
    fn format_name(&self) -> &'static str {
        "csv"
    }

    fn can_handle(&self, header: &[u8], content_type: Option<&str>) -> bool {
        if let Some(ct) = content_type {
            if ct.contains("text/csv") {
                return true;
            }
            if ct.contains("application/json") {
                return false;
            }
        }

        // First line should look like a header row naming the trace column.
        let trimmed = trim_leading_whitespace(header);
        let first_line = trimmed.split(|&b| b == b'\n').next().unwrap_or(&[]);
        let Ok(text) = std::str::from_utf8(first_line) else {
            return false;
        };
        text.contains(',') && text.contains("context.trace_id")
    }

    fn ingest(&self, data: &[u8]) -> Result<SpanTable> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(data);

        let headers = reader
            .headers()
            .map_err(|e| Error::parse("csv", e.to_string()))?
            .clone();

        let mut table = SpanTable::new();
        for record in reader.records() {
            let record = record.map_err(|e| Error::parse("csv", e.to_string()))?;
            let mut row = SpanRow::new();
            for (column, field) in headers.iter().zip(record.iter()) {
                if !field.is_empty() {
                    row.insert(column, field);
                }
            }
            table.push(row);
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns;

    #[test]
    fn format_name() {
        assert_eq!(CsvIngestor.format_name(), "csv");
    }

    #[test]
    fn handles_header_row() {
        assert!(CsvIngestor.can_handle(b"context.trace_id,name\nt-1,root\n", None));
        assert!(CsvIngestor.can_handle(b"whatever", Some("text/csv")));
        assert!(!CsvIngestor.can_handle(b"[{}]", None));
        assert!(!CsvIngestor.can_handle(b"{}", Some("application/json")));
    }

    #[test]
    fn ingests_records() {
        let data = b"context.trace_id,context.span_id,name,latency_ms,parent_id\n\
                     t-1,s-1,root,250.5,\n\
                     t-1,s-2,search_tool,40,s-1\n";

        let table = CsvIngestor.ingest(data).unwrap();
        assert_eq!(table.len(), 2);

        let rows = table.rows_for_trace("t-1");
        assert!(rows[0].is_root());
        assert!(!rows[1].is_root());
        assert_eq!(rows[0].get_f64(columns::LATENCY_MS), Some(250.5));
        assert_eq!(rows[1].get_str(columns::NAME), Some("search_tool"));
    }

    #[test]
    fn hexlike_ids_stay_strings() {
        let data = b"context.trace_id,context.span_id,name\n12e5,9e1,root\n";
        let table = CsvIngestor.ingest(data).unwrap();
        let row = table.iter().next().unwrap();
        assert_eq!(row.trace_id(), Some("12e5"));
    }
}
