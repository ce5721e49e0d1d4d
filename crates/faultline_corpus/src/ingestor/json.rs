//! JSON span ingestor.

use crate::cell::CellValue;
use crate::error::{Error, Result};
use crate::ingestor::{trim_leading_whitespace, SpanIngestor};
use crate::row::SpanRow;
use crate::table::SpanTable;
use serde_json::Value;

/// Ingestor for JSON span exports.
///
/// Supports two shapes:
/// - a JSON array of row objects
/// - a JSON object with a `"spans"` field containing the array
///
/// Row objects are flat: each key is a column name. Nested objects and
/// arrays are kept as their JSON text, which is how payload columns like
/// orchestrator inputs travel through the table.
pub struct JsonIngestor;

impl SpanIngestor for JsonIngestor {
    fn format_name(&self) -> &'static str {
        "json"
    }

    fn can_handle(&self, header: &[u8], content_type: Option<&str>) -> bool {
        if let Some(ct) = content_type {
            if ct.contains("application/json") {
                return true;
            }
            if ct.contains("text/csv") {
                return false;
            }
        }

        let trimmed = trim_leading_whitespace(header);
        matches!(trimmed.first(), Some(b'[' | b'{'))
    }

    fn ingest(&self, data: &[u8]) -> Result<SpanTable> {
        let value: Value = serde_json::from_slice(data)
            .map_err(|e| Error::parse("json", e.to_string()))?;

        let rows = match value {
            Value::Array(rows) => rows,
            Value::Object(mut obj) => match obj.remove("spans") {
                Some(Value::Array(rows)) => rows,
                _ => {
                    return Err(Error::parse(
                        "json",
                        "expected an array of rows or an object with a \"spans\" array",
                    ))
                }
            },
            _ => {
                return Err(Error::parse(
                    "json",
                    "expected an array of rows or an object with a \"spans\" array",
                ))
            }
        };

        let mut table = SpanTable::new();
        for (index, row_value) in rows.into_iter().enumerate() {
            let Value::Object(fields) = row_value else {
                return Err(Error::parse("json", format!("row {index} is not an object")));
            };

            let mut row = SpanRow::new();
            for (column, cell) in fields {
                if let Some(cell) = json_cell(cell) {
                    row.insert(column, cell);
                }
            }
            table.push(row);
        }

        Ok(table)
    }
}

/// Converts a JSON value into a cell, dropping nulls.
fn json_cell(value: Value) -> Option<CellValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(CellValue::Bool(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(CellValue::Int(i))
            } else {
                n.as_f64().map(CellValue::Float)
            }
        }
        Value::String(s) => Some(CellValue::Str(s)),
        nested @ (Value::Array(_) | Value::Object(_)) => {
            Some(CellValue::Str(nested.to_string()))
        }
    }
}
