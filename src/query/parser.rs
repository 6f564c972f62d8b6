//! Query model parser
//!
//! Turns the loosely-typed JSON model a dashboard sends for one query target
//! into a validated [`QueryDescriptor`]. Parsing fails fast: the first missing
//! or malformed field aborts with a [`ParseError`] naming it, and no partial
//! descriptor is ever returned.
//!
//! # Example
//!
//! ```rust
//! use kuba_cloudwatch::query::parse_query;
//! use serde_json::json;
//!
//! let query = parse_query(&json!({
//!     "region": "us-east-1",
//!     "namespace": "AWS/EC2",
//!     "metricName": "CPUUtilization",
//!     "dimensions": { "InstanceId": "i-12345678" },
//!     "statistics": ["Average", "p99.00"],
//! }))
//! .unwrap();
//!
//! assert_eq!(query.period, 300);
//! assert_eq!(query.extended_statistics, vec!["p99.00"]);
//! ```

use crate::error::ParseError;
use crate::query::statistic::classify_value;
use crate::types::{Dimension, Statistic};
use serde_json::{Map, Value};

/// Namespace whose metrics default to a 5 minute period
pub const EC2_NAMESPACE: &str = "AWS/EC2";

/// Default period for EC2 metrics (basic monitoring granularity)
pub const EC2_DEFAULT_PERIOD_SECS: u32 = 300;

/// Default period for every other namespace
pub const DEFAULT_PERIOD_SECS: u32 = 60;

/// Largest period the API accepts (its period field is a signed 32-bit int)
pub const MAX_PERIOD_SECS: u32 = i32::MAX as u32;

/// Typed, validated description of one CloudWatch query target
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    /// Region to query (`default` resolves to the datasource region)
    pub region: String,
    /// Metric namespace
    pub namespace: String,
    /// Metric name
    pub metric_name: String,
    /// Dimensions in the order the model listed them
    pub dimensions: Vec<Dimension>,
    /// Standard statistics, in request order
    pub statistics: Vec<Statistic>,
    /// Extended statistic names, in request order
    pub extended_statistics: Vec<String>,
    /// Period in seconds
    pub period: u32,
    /// Legend template; empty means default naming
    pub legend_format: String,
}

impl QueryDescriptor {
    /// Every requested statistic, standard first then extended
    pub fn requested_statistics(&self) -> Vec<Statistic> {
        self.statistics
            .iter()
            .cloned()
            .chain(
                self.extended_statistics
                    .iter()
                    .cloned()
                    .map(Statistic::Extended),
            )
            .collect()
    }
}

/// Period used when a query does not specify one
pub fn default_period(namespace: &str) -> u32 {
    if namespace == EC2_NAMESPACE {
        EC2_DEFAULT_PERIOD_SECS
    } else {
        DEFAULT_PERIOD_SECS
    }
}

/// Parse a query model into a [`QueryDescriptor`]
pub fn parse_query(model: &Value) -> Result<QueryDescriptor, ParseError> {
    let model = as_object(model)?;

    let region = required_string(model, "region")?;
    let namespace = required_string(model, "namespace")?;
    let metric_name = required_string(model, "metricName")?;
    let dimensions = parse_dimensions(model.get("dimensions"))?;
    let statistics = classify_value(model.get("statistics"))?;
    let period = parse_period(model.get("period"))?.unwrap_or_else(|| default_period(&namespace));
    let legend_format = parse_legend_format(model)?;

    Ok(QueryDescriptor {
        region,
        namespace,
        metric_name,
        dimensions,
        statistics: statistics.standard,
        extended_statistics: statistics.extended,
        period,
        legend_format,
    })
}

pub(crate) fn as_object(model: &Value) -> Result<&Map<String, Value>, ParseError> {
    model.as_object().ok_or_else(|| ParseError::InvalidType {
        field: "model".to_string(),
        expected: "object",
    })
}

/// Extract a required string member; absent or null is a missing field
pub(crate) fn required_string(
    model: &Map<String, Value>,
    field: &str,
) -> Result<String, ParseError> {
    match model.get(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field.to_string())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ParseError::InvalidType {
            field: field.to_string(),
            expected: "string",
        }),
    }
}

/// Extract an optional string member, defaulting to empty
pub(crate) fn optional_string(
    model: &Map<String, Value>,
    field: &str,
) -> Result<String, ParseError> {
    match model.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ParseError::InvalidType {
            field: field.to_string(),
            expected: "string",
        }),
    }
}

/// Parse the `dimensions` member, a string to string mapping
///
/// Member order is preserved so tags come out in a deterministic order.
pub(crate) fn parse_dimensions(value: Option<&Value>) -> Result<Vec<Dimension>, ParseError> {
    let map = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ParseError::InvalidType {
                field: "dimensions".to_string(),
                expected: "object",
            })
        }
    };

    map.iter()
        .map(|(name, value)| match value {
            Value::String(v) => Ok(Dimension::new(name.clone(), v.clone())),
            _ => Err(ParseError::InvalidType {
                field: format!("dimensions.{}", name),
                expected: "string",
            }),
        })
        .collect()
}

/// Parse the `period` member
///
/// Returns `Ok(None)` when absent or empty so the caller applies its default.
/// A present value must be a positive integer number of seconds, given either
/// as a string or a JSON number.
pub(crate) fn parse_period(value: Option<&Value>) -> Result<Option<u32>, ParseError> {
    let invalid = |message: String| ParseError::InvalidValue {
        field: "period".to_string(),
        message,
    };

    let seconds = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| invalid(format!("'{}' is not a whole number of seconds", s)))?,
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| invalid(format!("{} is not a whole number of seconds", n)))?,
        Some(_) => {
            return Err(ParseError::InvalidType {
                field: "period".to_string(),
                expected: "string",
            })
        }
    };

    if seconds == 0 {
        return Err(invalid("must be greater than zero".to_string()));
    }
    if seconds > MAX_PERIOD_SECS {
        return Err(invalid(format!("must be at most {} seconds", MAX_PERIOD_SECS)));
    }
    Ok(Some(seconds))
}

/// `alias` wins over `legendFormat` when both are set
fn parse_legend_format(model: &Map<String, Value>) -> Result<String, ParseError> {
    let alias = optional_string(model, "alias")?;
    if !alias.is_empty() {
        return Ok(alias);
    }
    optional_string(model, "legendFormat")
}
