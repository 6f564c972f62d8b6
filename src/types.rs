//! Core data types shared by the query pipeline, the discovery cache and the
//! CloudWatch client seam
//!
//! # Key Types
//!
//! - **`TimeRange`**: Query window in epoch milliseconds
//! - **`Dimension`**: Name/value pair qualifying a metric
//! - **`Statistic`**: Closed set of standard aggregates plus extended (percentile) names
//! - **`Datapoint`** / **`StatisticsResponse`**: Shape of a GetMetricStatistics answer
//! - **`MetricDescriptor`**: One entry of a ListMetrics answer
//! - **`MetricAlarm`** / **`AlarmHistoryItem`**: Alarm metadata for annotations
//! - **`DatasourceInfo`**: Credential profile, region and namespace a call is bound to
//!
//! Upstream-shaped types serialize in PascalCase so raw pass-through actions
//! keep the field names dashboard clients already expect.
//!
//! # Example
//!
//! ```rust
//! use kuba_cloudwatch::types::{Statistic, TimeRange};
//!
//! let range = TimeRange::new(1_000, 2_000).unwrap();
//! assert!(range.contains(1_500));
//!
//! assert!(Statistic::parse("Average").is_standard());
//! assert_eq!(Statistic::parse("p99.00"), Statistic::Extended("p99.00".to_string()));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Time window for a query, in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp in milliseconds (inclusive)
    pub start: i64,

    /// End timestamp in milliseconds (inclusive)
    pub end: i64,
}

impl TimeRange {
    /// Create a new time range with validation
    ///
    /// Returns `Err` when `start > end`.
    pub fn new(start: i64, end: i64) -> Result<Self, String> {
        if start > end {
            return Err(format!(
                "Invalid time range: start ({}) must be <= end ({})",
                start, end
            ));
        }
        Ok(Self { start, end })
    }

    /// Check if a timestamp falls within this range (inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Duration of the range in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    /// Move both ends of the window by `offset_ms` (negative moves earlier)
    pub fn shifted(&self, offset_ms: i64) -> Self {
        Self {
            start: self.start.saturating_add(offset_ms),
            end: self.end.saturating_add(offset_ms),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Name/value pair qualifying a metric (e.g. `InstanceId=i-123`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    /// Dimension name
    pub name: String,
    /// Dimension value
    pub value: String,
}

impl Dimension {
    /// Create a dimension
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Dimension filter for raw ListMetrics calls; a missing value matches any value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DimensionFilter {
    /// Dimension name
    pub name: String,
    /// Optional dimension value
    #[serde(default)]
    pub value: Option<String>,
}

/// Statistic requested from the monitoring API
///
/// The five standard aggregates are a fixed, closed set computed natively by
/// CloudWatch. Every other identifier (typically a percentile such as
/// `p90.00`) is carried as `Extended` and resolved through the per-datapoint
/// extended statistics map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Statistic {
    /// Mean of all samples in the period
    Average,
    /// Highest sample in the period
    Maximum,
    /// Lowest sample in the period
    Minimum,
    /// Sum of all samples in the period
    Sum,
    /// Number of samples in the period
    SampleCount,
    /// Any non-standard statistic, kept verbatim
    Extended(String),
}

impl Statistic {
    /// The standard statistics, in their canonical order
    pub const STANDARD: [Statistic; 5] = [
        Statistic::Average,
        Statistic::Maximum,
        Statistic::Minimum,
        Statistic::Sum,
        Statistic::SampleCount,
    ];

    /// Classify a statistic name; unknown names become `Extended`
    pub fn parse(name: &str) -> Self {
        match name {
            "Average" => Statistic::Average,
            "Maximum" => Statistic::Maximum,
            "Minimum" => Statistic::Minimum,
            "Sum" => Statistic::Sum,
            "SampleCount" => Statistic::SampleCount,
            other => Statistic::Extended(other.to_string()),
        }
    }

    /// Wire name of the statistic
    pub fn as_str(&self) -> &str {
        match self {
            Statistic::Average => "Average",
            Statistic::Maximum => "Maximum",
            Statistic::Minimum => "Minimum",
            Statistic::Sum => "Sum",
            Statistic::SampleCount => "SampleCount",
            Statistic::Extended(name) => name,
        }
    }

    /// True for the five API-native aggregates
    pub fn is_standard(&self) -> bool {
        !matches!(self, Statistic::Extended(_))
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Statistic {
    fn from(name: String) -> Self {
        match Statistic::parse(&name) {
            Statistic::Extended(_) => Statistic::Extended(name),
            standard => standard,
        }
    }
}

impl From<Statistic> for String {
    fn from(statistic: Statistic) -> Self {
        match statistic {
            Statistic::Extended(name) => name,
            standard => standard.as_str().to_string(),
        }
    }
}

/// One datapoint of a GetMetricStatistics answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    /// Datapoint timestamp in milliseconds since epoch
    pub timestamp: i64,
    /// Average aggregate, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    /// Maximum aggregate, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum aggregate, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Sum aggregate, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<f64>,
    /// Sample count, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<f64>,
    /// Extended statistics keyed by their requested name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extended_statistics: HashMap<String, f64>,
    /// Unit reported by the API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl Datapoint {
    /// Value of `statistic` at this datapoint, if the API returned one
    pub fn value(&self, statistic: &Statistic) -> Option<f64> {
        match statistic {
            Statistic::Average => self.average,
            Statistic::Maximum => self.maximum,
            Statistic::Minimum => self.minimum,
            Statistic::Sum => self.sum,
            Statistic::SampleCount => self.sample_count,
            Statistic::Extended(name) => self.extended_statistics.get(name).copied(),
        }
    }
}

/// GetMetricStatistics answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatisticsResponse {
    /// Label the API attached to the series (usually the metric name)
    #[serde(default)]
    pub label: Option<String>,
    /// Datapoints in the order the API returned them
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,
}

/// Parameters of one GetMetricStatistics call
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRequest {
    /// Metric namespace
    pub namespace: String,
    /// Metric name
    pub metric_name: String,
    /// Dimensions selecting one metric stream
    pub dimensions: Vec<Dimension>,
    /// Standard statistics to compute
    pub statistics: Vec<Statistic>,
    /// Extended statistic names to compute
    pub extended_statistics: Vec<String>,
    /// Period in seconds
    pub period: u32,
    /// Window to fetch (already shifted for ingestion delay when built by the adapter)
    pub range: TimeRange,
}

/// One metric stream returned by ListMetrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDescriptor {
    /// Metric namespace
    #[serde(default)]
    pub namespace: String,
    /// Metric name
    pub metric_name: String,
    /// Dimensions of this stream
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
}

/// Parameters of one raw ListMetrics page request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMetricsRequest {
    /// Namespace to list
    pub namespace: String,
    /// Optional metric name filter
    pub metric_name: Option<String>,
    /// Optional dimension filters
    pub dimensions: Vec<DimensionFilter>,
    /// Continuation token from the previous page
    pub next_token: Option<String>,
}

impl ListMetricsRequest {
    /// Request listing every metric of a namespace
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }
}

/// One page of a ListMetrics answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListMetricsPage {
    /// Metrics on this page
    #[serde(default)]
    pub metrics: Vec<MetricDescriptor>,
    /// Token for the next page, `None` on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Alarm lookup criteria
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmFilter {
    /// Alarms whose action ARN and alarm name start with the given prefixes
    /// (an empty prefix matches everything)
    Prefix {
        /// Action ARN prefix
        action_prefix: String,
        /// Alarm name prefix
        alarm_name_prefix: String,
        /// Maximum number of alarms to return
        max_records: u32,
    },
    /// Alarms attached to one exact metric stream and statistic
    Metric {
        /// Metric namespace
        namespace: String,
        /// Metric name
        metric_name: String,
        /// Dimensions of the stream (empty means unspecified)
        dimensions: Vec<Dimension>,
        /// Statistic the alarm evaluates (`None` leaves it unspecified)
        statistic: Option<Statistic>,
        /// Evaluation period in seconds
        period: Option<u32>,
    },
}

/// Alarm metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricAlarm {
    /// Alarm name
    pub alarm_name: String,
    /// Namespace of the watched metric
    #[serde(default)]
    pub namespace: Option<String>,
    /// Name of the watched metric
    #[serde(default)]
    pub metric_name: Option<String>,
    /// Dimensions of the watched metric
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    /// Statistic evaluated (standard or extended)
    #[serde(default)]
    pub statistic: Option<Statistic>,
    /// Evaluation period in seconds
    #[serde(default)]
    pub period: Option<u32>,
    /// Actions fired on transition to ALARM
    #[serde(default)]
    pub alarm_actions: Vec<String>,
}

/// One entry of an alarm's history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlarmHistoryItem {
    /// Alarm the item belongs to
    pub alarm_name: String,
    /// Time of the history item in milliseconds since epoch
    pub timestamp: i64,
    /// Kind of item (`StateUpdate`, `ConfigurationUpdate`, `Action`)
    pub history_item_type: String,
    /// Human-readable summary
    pub history_summary: String,
}

/// Credential profile, region and namespace a CloudWatch call is bound to
///
/// The secret key is never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DatasourceInfo {
    /// Credential profile name
    pub profile: String,
    /// AWS region
    pub region: String,
    /// Metric namespace (only meaningful for discovery lookups)
    pub namespace: String,
    /// Role to assume before calling the API
    pub assume_role_arn: Option<String>,
    /// Static access key id
    pub access_key: Option<String>,
    /// Static secret access key
    pub secret_key: Option<String>,
}

impl DatasourceInfo {
    /// Create info for a profile and region
    pub fn new(profile: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            region: region.into(),
            ..Default::default()
        }
    }

    /// Copy of this info bound to another region
    pub fn with_region(&self, region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..self.clone()
        }
    }

    /// Info for a region named in a request
    ///
    /// An empty region or the literal `default` keeps the configured region.
    pub fn for_request_region(&self, region: &str) -> Self {
        if region.is_empty() || region == "default" {
            self.clone()
        } else {
            self.with_region(region)
        }
    }

    /// Copy of this info bound to a namespace
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..self.clone()
        }
    }
}

impl fmt::Debug for DatasourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceInfo")
            .field("profile", &self.profile)
            .field("region", &self.region)
            .field("namespace", &self.namespace)
            .field("assume_role_arn", &self.assume_role_arn)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
