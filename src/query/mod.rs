//! Query pipeline for CloudWatch-backed dashboards
//!
//! # Architecture
//!
//! ```text
//! Query model (JSON)
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Parse     │  parser + statistic classifier → QueryDescriptor
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Fetch     │  MetricsClient (window shifted for publish delay)
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │  Transform  │  one series per statistic, legend templating
//! └─────────────┘
//!      │
//!      ▼
//! ┌─────────────┐
//! │   Result    │  per-refId QueryResult
//! └─────────────┘
//! ```
//!
//! Annotation queries take a parallel path through [`annotation`] and come
//! back as a table.
//!
//! # Example
//!
//! ```rust
//! use kuba_cloudwatch::query::{parse_query, transform_response};
//! use kuba_cloudwatch::types::{Datapoint, StatisticsResponse};
//! use serde_json::json;
//!
//! let query = parse_query(&json!({
//!     "region": "us-east-1",
//!     "namespace": "AWS/RDS",
//!     "metricName": "CPUUtilization",
//!     "statistics": ["Average"],
//!     "alias": "{{metric}} {{stat}}"
//! }))
//! .unwrap();
//!
//! let response = StatisticsResponse {
//!     label: Some("CPUUtilization".to_string()),
//!     datapoints: vec![Datapoint { timestamp: 0, average: Some(1.0), ..Default::default() }],
//! };
//! let series = transform_response(&response, &query);
//! assert_eq!(series[0].name, "CPUUtilization Average");
//! ```

pub mod annotation;
pub mod executor;
pub mod parser;
pub mod result;
pub mod statistic;
pub mod transform;

// Re-export main types
pub use annotation::{
    events_to_table, execute_annotation_query, filter_alarms, find_alarms,
    parse_annotation_query, AnnotationEvent, AnnotationQuery,
};
pub use executor::{CloudWatchExecutor, ExecutorConfig, Query, QueryKind, TsdbQuery};
pub use parser::{default_period, parse_query, QueryDescriptor};
pub use result::{QueryResult, Response, ResultMetadata, Table, TimePoint, TimeSeries};
pub use statistic::{classify, classify_value, ClassifiedStatistics};
pub use transform::{format_legend, series_name, transform_response};
