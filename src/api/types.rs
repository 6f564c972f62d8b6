//! Request and response bodies of the HTTP surface

use crate::error::{Error, Result};
use crate::query::Query;
use crate::types::TimeRange;
use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// A timestamp as hosts send it
///
/// Epoch milliseconds as a JSON number, the same as a decimal string, or an
/// RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Epoch milliseconds
    Millis(i64),
    /// Epoch milliseconds or RFC 3339, as text
    Text(String),
}

impl Timestamp {
    /// Resolve to epoch milliseconds
    pub fn to_millis(&self, field: &str) -> Result<i64> {
        match self {
            Timestamp::Millis(ms) => Ok(*ms),
            Timestamp::Text(text) => {
                let text = text.trim();
                if let Ok(ms) = text.parse::<i64>() {
                    return Ok(ms);
                }
                DateTime::parse_from_rfc3339(text)
                    .map(|dt| dt.timestamp_millis())
                    .map_err(|e| {
                        Error::InvalidRequest(format!("Invalid {} timestamp {:?}: {}", field, text, e))
                    })
            }
        }
    }
}

/// Body of `POST /api/tsdb/query`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    /// Window start
    pub from: Timestamp,
    /// Window end
    pub to: Timestamp,
    /// Query targets
    #[serde(default)]
    pub queries: Vec<Query>,
}

impl QueryRequest {
    /// The validated query window
    pub fn time_range(&self) -> Result<TimeRange> {
        TimeRange::new(self.from.to_millis("from")?, self.to.to_millis("to")?)
            .map_err(Error::InvalidRequest)
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub message: String,
}

/// Health check body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` while the process serves requests
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}
