//! Statistic classification
//!
//! Splits a caller's statistic list into the standard aggregates CloudWatch
//! computes natively and extended (percentile-style) identifiers. The split is
//! a stable partition: every input name lands in exactly one bucket and each
//! bucket keeps the input's relative order.

use crate::error::ParseError;
use crate::types::Statistic;
use serde_json::Value;

/// Result of classifying a statistic list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedStatistics {
    /// Standard aggregates, in input order
    pub standard: Vec<Statistic>,
    /// Extended statistic names, in input order
    pub extended: Vec<String>,
}

impl ClassifiedStatistics {
    /// True when no statistic was requested
    pub fn is_empty(&self) -> bool {
        self.standard.is_empty() && self.extended.is_empty()
    }

    /// All statistics, standard first then extended
    pub fn all(&self) -> Vec<Statistic> {
        self.standard
            .iter()
            .cloned()
            .chain(self.extended.iter().cloned().map(Statistic::Extended))
            .collect()
    }
}

/// Partition statistic names into standard and extended buckets
pub fn classify<I, S>(names: I) -> ClassifiedStatistics
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut classified = ClassifiedStatistics::default();
    for name in names {
        match Statistic::parse(name.as_ref()) {
            Statistic::Extended(name) => classified.extended.push(name),
            standard => classified.standard.push(standard),
        }
    }
    classified
}

/// Classify the `statistics` member of a query model
///
/// An absent or null member yields an empty classification. Any non-string
/// entry fails the whole request.
pub fn classify_value(value: Option<&Value>) -> Result<ClassifiedStatistics, ParseError> {
    let entries = match value {
        None | Some(Value::Null) => return Ok(ClassifiedStatistics::default()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(ParseError::InvalidType {
                field: "statistics".to_string(),
                expected: "array",
            })
        }
    };

    let mut names = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match entry.as_str() {
            Some(name) => names.push(name),
            None => {
                return Err(ParseError::InvalidType {
                    field: format!("statistics[{}]", index),
                    expected: "string",
                })
            }
        }
    }

    Ok(classify(names))
}
