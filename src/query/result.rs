//! Query result types
//!
//! Generic time-series envelope consumed by the visualization layer: a map
//! from query reference id to a result holding metadata, named/tagged series
//! of `[value, timestamp_ms]` points, and tables (used for annotations).

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

// ============================================================================
// Series
// ============================================================================

/// A single point; serialized as `[value, timestamp]` with a nullable value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    /// Milliseconds since epoch
    pub timestamp: i64,
    /// Value, `None` when the upstream had no value
    pub value: Option<f64>,
}

impl TimePoint {
    /// Create a point
    pub fn new(timestamp: i64, value: Option<f64>) -> Self {
        Self { timestamp, value }
    }
}

impl Serialize for TimePoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.value)?;
        tuple.serialize_element(&self.timestamp)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for TimePoint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (value, timestamp) = <(Option<f64>, i64)>::deserialize(deserializer)?;
        Ok(Self { timestamp, value })
    }
}

/// Named, tagged series of points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Display name (legend label)
    pub name: String,
    /// Dimension name to value
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Points in ascending timestamp order
    pub points: Vec<TimePoint>,
}

impl TimeSeries {
    /// Create an empty series
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Tables
// ============================================================================

/// Table column header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Column title
    pub text: String,
}

/// Tabular result (rows of JSON cells)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Column headers
    pub columns: Vec<TableColumn>,
    /// Rows; each row has one cell per column
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl Table {
    /// Create a table with the given column titles and no rows
    pub fn with_columns(titles: &[&str]) -> Self {
        Self {
            columns: titles
                .iter()
                .map(|t| TableColumn {
                    text: t.to_string(),
                })
                .collect(),
            rows: Vec::new(),
        }
    }
}

// ============================================================================
// Query Result
// ============================================================================

/// Result for one query of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Reference id of the query this result answers
    pub ref_id: String,
    /// Execution metadata
    pub meta: ResultMetadata,
    /// Time series
    #[serde(default)]
    pub series: Vec<TimeSeries>,
    /// Tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Table>,
    /// Error message when this query failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResult {
    /// Create an empty result
    pub fn empty(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            ..Default::default()
        }
    }

    /// Create a result from series
    pub fn from_series(ref_id: impl Into<String>, series: Vec<TimeSeries>) -> Self {
        let point_count = series.iter().map(|s| s.points.len()).sum();
        Self {
            ref_id: ref_id.into(),
            meta: ResultMetadata {
                series_count: series.len(),
                point_count,
                ..Default::default()
            },
            series,
            ..Default::default()
        }
    }

    /// Create a result from a table
    pub fn from_table(ref_id: impl Into<String>, table: Table) -> Self {
        Self {
            ref_id: ref_id.into(),
            meta: ResultMetadata {
                row_count: table.rows.len(),
                ..Default::default()
            },
            tables: vec![table],
            ..Default::default()
        }
    }

    /// Mark the result as failed
    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Set execution time metadata
    pub fn with_execution_time(mut self, duration: Duration) -> Self {
        self.meta.execution_time_us = duration.as_micros() as u64;
        self
    }

    /// True when the query failed
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// Result Metadata
// ============================================================================

/// Query result metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    /// Number of series in the result
    #[serde(default)]
    pub series_count: usize,

    /// Total points across all series
    #[serde(default)]
    pub point_count: usize,

    /// Number of table rows
    #[serde(skip_serializing_if = "is_zero")]
    #[serde(default)]
    pub row_count: usize,

    /// Query execution time in microseconds
    #[serde(default)]
    pub execution_time_us: u64,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

// ============================================================================
// Batch Response
// ============================================================================

/// Results of a batch keyed by query reference id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Result per reference id
    pub results: BTreeMap<String, QueryResult>,
}

impl Response {
    /// Add a result under its reference id
    pub fn insert(&mut self, result: QueryResult) {
        self.results.insert(result.ref_id.clone(), result);
    }

    /// Result for a reference id
    pub fn get(&self, ref_id: &str) -> Option<&QueryResult> {
        self.results.get(ref_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_wire_format() {
        let json = serde_json::to_value(TimePoint::new(1_000, Some(2.5))).unwrap();
        assert_eq!(json, json!([2.5, 1000]));

        let json = serde_json::to_value(TimePoint::new(1_000, None)).unwrap();
        assert_eq!(json, json!([null, 1000]));

        let back: TimePoint = serde_json::from_value(json!([7.0, 42])).unwrap();
        assert_eq!(back, TimePoint::new(42, Some(7.0)));
    }

    #[test]
    fn test_from_series_counts() {
        let mut a = TimeSeries::new("a");
        a.points.push(TimePoint::new(0, Some(1.0)));
        a.points.push(TimePoint::new(1, Some(2.0)));
        let b = TimeSeries::new("b");

        let result = QueryResult::from_series("A", vec![a, b]);
        assert_eq!(result.meta.series_count, 2);
        assert_eq!(result.meta.point_count, 2);
        assert!(!result.is_error());
    }

    #[test]
    fn test_error_result_serialization() {
        let result = QueryResult::empty("B").with_error("Parse error: Missing required field: region");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["refId"], "B");
        assert!(json["error"].as_str().unwrap().contains("region"));
        assert!(json.get("tables").is_none());
    }

    #[test]
    fn test_response_keyed_by_ref_id() {
        let mut response = Response::default();
        response.insert(QueryResult::empty("A"));
        response.insert(QueryResult::empty("B").with_error("boom"));

        assert_eq!(response.results.len(), 2);
        assert!(response.get("B").unwrap().is_error());
        assert!(response.get("C").is_none());
    }

    #[test]
    fn test_table_with_columns() {
        let table = Table::with_columns(&["time", "title"]);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[1].text, "title");
        assert!(table.rows.is_empty());
    }
}
