//! Kuba CloudWatch - CloudWatch datasource backend for dashboards
//!
//! This library turns dashboard query models into CloudWatch calls and the
//! answers back into named time series:
//! - Query parsing with standard/extended statistic classification
//! - A metrics client adapter that shifts windows for the publish delay
//! - Legend templating over labels, statistics and dimensions
//! - A TTL discovery cache for custom-namespace metric names and dimension keys
//! - Alarm-history annotations in prefix or exact-metric mode

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Built-in namespace catalog and region list
pub mod catalog;

/// CloudWatch API seam, client adapter and backends
pub mod client;

/// Discovery cache for custom namespaces
pub mod cache;

/// Query parsing, execution and response shaping
pub mod query;

/// Region, namespace, metric and dimension suggestions
pub mod metadata;

/// Datasource action dispatch
pub mod actions;

/// HTTP surface
pub mod api;

// Re-export main types
pub use actions::{Action, ActionDispatcher, ActionRequest};
pub use cache::{CustomMetricsCache, DiscoveryCache};
pub use client::{ClientFactory, CloudWatchApi, MetricsClient, StaticClientFactory};
pub use config::Config;
pub use error::{Error, Result};
pub use query::{CloudWatchExecutor, Query, QueryDescriptor, QueryResult, TsdbQuery};
pub use types::{DatasourceInfo, Dimension, Statistic, TimeRange};
