//! Query Executor - request pipeline for a batch of dashboard queries
//!
//! Each query of a batch runs on its own, in order:
//!
//! ```text
//! ┌─────────────────┐
//! │  Query model    │  ← JSON target from the dashboard
//! └────────┬────────┘
//!          │ parse (time series or annotation)
//! ┌────────▼────────┐
//! │  Descriptor     │  ← typed, validated
//! └────────┬────────┘
//!          │ connect (region resolved against the datasource)
//! ┌────────▼────────┐
//! │  MetricsClient  │  ← GetMetricStatistics / alarms + history
//! └────────┬────────┘
//!          │ transform
//! ┌────────▼────────┐
//! │  QueryResult    │  ← series or annotation table, keyed by refId
//! └─────────────────┘
//! ```
//!
//! A failing query records its error in its own result; the rest of the
//! batch still runs.

use crate::client::ClientFactory;
use crate::error::{Result, UpstreamError};
use crate::metrics;
use crate::query::annotation::{events_to_table, execute_annotation_query, parse_annotation_query};
use crate::query::parser::parse_query;
use crate::query::result::{QueryResult, Response};
use crate::query::transform::transform_response;
use crate::types::{DatasourceInfo, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Reference id used when a query carries none
pub const DEFAULT_REF_ID: &str = "A";

/// Model `type` that selects the annotation path
pub const ANNOTATION_QUERY_TYPE: &str = "annotationQuery";

// ============================================================================
// Executor Configuration
// ============================================================================

/// Configuration for query execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on one query, remote calls included (default: 30 seconds)
    pub timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl ExecutorConfig {
    /// Create a new executor config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set query timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Requests
// ============================================================================

/// One query target of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Reference id the result is keyed by
    #[serde(rename = "refId", default = "default_ref_id")]
    pub ref_id: String,

    /// The untyped query model
    #[serde(flatten)]
    pub model: Map<String, Value>,
}

fn default_ref_id() -> String {
    DEFAULT_REF_ID.to_string()
}

impl Query {
    /// Create a query from a model
    pub fn new(ref_id: impl Into<String>, model: Value) -> Self {
        let model = match model {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            ref_id: ref_id.into(),
            model,
        }
    }

    /// Which pipeline this query takes
    pub fn kind(&self) -> QueryKind {
        match self.model.get("type").and_then(Value::as_str) {
            Some(ANNOTATION_QUERY_TYPE) => QueryKind::Annotation,
            _ => QueryKind::TimeSeries,
        }
    }
}

/// Pipeline a query takes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Metric statistics folded into series
    TimeSeries,
    /// Alarm history folded into an annotation table
    Annotation,
}

impl QueryKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::TimeSeries => "timeseries",
            QueryKind::Annotation => "annotation",
        }
    }
}

/// A batch of queries over one time window
#[derive(Debug, Clone, PartialEq)]
pub struct TsdbQuery {
    /// Window shared by every query
    pub time_range: TimeRange,
    /// Queries in request order
    pub queries: Vec<Query>,
}

// ============================================================================
// Executor
// ============================================================================

/// Executes dashboard query batches against CloudWatch
pub struct CloudWatchExecutor {
    base: DatasourceInfo,
    clients: Arc<dyn ClientFactory>,
    config: ExecutorConfig,
}

impl CloudWatchExecutor {
    /// Create an executor for a datasource
    pub fn new(base: DatasourceInfo, clients: Arc<dyn ClientFactory>) -> Self {
        Self::with_config(base, clients, ExecutorConfig::default())
    }

    /// Create an executor with custom configuration
    pub fn with_config(
        base: DatasourceInfo,
        clients: Arc<dyn ClientFactory>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            base,
            clients,
            config,
        }
    }

    /// Datasource the executor is bound to
    pub fn datasource(&self) -> &DatasourceInfo {
        &self.base
    }

    /// Client factory used for every query
    pub fn clients(&self) -> &Arc<dyn ClientFactory> {
        &self.clients
    }

    /// Execute every query of the batch, sequentially
    pub async fn execute(&self, request: &TsdbQuery) -> Response {
        let mut response = Response::default();
        for query in &request.queries {
            response.insert(self.execute_query(query, request.time_range).await);
        }
        response
    }

    /// Execute one query; failures are recorded in the result
    pub async fn execute_query(&self, query: &Query, range: TimeRange) -> QueryResult {
        let start = Instant::now();
        let kind = query.kind();

        let outcome = match tokio::time::timeout(self.config.timeout, self.run(kind, query, range))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(UpstreamError::new(
                "Query",
                format!("timed out after {:?}", self.config.timeout),
            )
            .into()),
        };

        let elapsed = start.elapsed();
        metrics::record_query(kind.as_str(), elapsed.as_secs_f64());

        let result = match outcome {
            Ok(result) => {
                debug!(
                    ref_id = %query.ref_id,
                    kind = kind.as_str(),
                    series = result.meta.series_count,
                    rows = result.meta.row_count,
                    "Query executed"
                );
                result
            }
            Err(e) => {
                warn!(ref_id = %query.ref_id, kind = kind.as_str(), error = %e, "Query failed");
                QueryResult::empty(query.ref_id.clone()).with_error(e)
            }
        };
        result.with_execution_time(elapsed)
    }

    async fn run(&self, kind: QueryKind, query: &Query, range: TimeRange) -> Result<QueryResult> {
        let model = Value::Object(query.model.clone());
        match kind {
            QueryKind::TimeSeries => {
                let descriptor = parse_query(&model)?;
                let info = self.base.for_request_region(&descriptor.region);
                let client = self.clients.connect(&info).await?;
                let response = client.get_statistics(&descriptor, range).await?;
                let series = transform_response(&response, &descriptor);
                Ok(QueryResult::from_series(query.ref_id.clone(), series))
            }
            QueryKind::Annotation => {
                let annotation = parse_annotation_query(&model)?;
                let events =
                    execute_annotation_query(&annotation, range, &self.base, self.clients.as_ref())
                        .await?;
                Ok(QueryResult::from_table(
                    query.ref_id.clone(),
                    events_to_table(&events),
                ))
            }
        }
    }
}
