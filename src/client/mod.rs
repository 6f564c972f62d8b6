//! CloudWatch client adapter
//!
//! [`CloudWatchApi`] is the seam between the query pipeline and the remote
//! monitoring service: one method per raw API call, each answering one page
//! or one response. [`MetricsClient`] wraps an implementation bound to a
//! region and adds the behavior the rest of the crate relies on:
//!
//! - statistics windows are shifted ten minutes earlier to cover the
//!   service's publish delay
//! - `list_all_metrics` follows continuation tokens until exhausted
//! - every call is counted in the Prometheus registry
//!
//! No call is retried. A failure surfaces as one [`UpstreamError`] carrying
//! the cause.
//!
//! # Backends
//!
//! - [`aws::AwsClientFactory`] (feature `aws`): the real service via the AWS SDK
//! - [`stubs::InMemoryCloudWatch`]: canned answers and call recording for tests

#[cfg(feature = "aws")]
pub mod aws;
pub mod stubs;

use crate::error::UpstreamError;
use crate::metrics;
use crate::query::QueryDescriptor;
use crate::types::{
    AlarmFilter, AlarmHistoryItem, DatasourceInfo, ListMetricsPage, ListMetricsRequest,
    MetricAlarm, MetricDescriptor, StatisticsRequest, StatisticsResponse, TimeRange,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Delay applied to every statistics window (ten minutes, in milliseconds)
pub const PUBLISH_DELAY_MS: i64 = 10 * 60 * 1000;

// ============================================================================
// API Seam
// ============================================================================

/// Raw CloudWatch operations used by the datasource
///
/// Implementations are bound to one region and one credential set.
#[async_trait]
pub trait CloudWatchApi: Send + Sync + 'static {
    /// GetMetricStatistics
    async fn get_metric_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> Result<StatisticsResponse, UpstreamError>;

    /// One page of ListMetrics
    async fn list_metrics(
        &self,
        request: &ListMetricsRequest,
    ) -> Result<ListMetricsPage, UpstreamError>;

    /// DescribeAlarms (prefix filter) or DescribeAlarmsForMetric (metric filter)
    async fn describe_alarms(&self, filter: &AlarmFilter)
        -> Result<Vec<MetricAlarm>, UpstreamError>;

    /// DescribeAlarmHistory for one alarm within a window
    async fn describe_alarm_history(
        &self,
        alarm_name: &str,
        history_item_type: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<AlarmHistoryItem>, UpstreamError>;
}

/// Builds region-bound clients from datasource info
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    /// Resolve credentials and bind a client to `info.region`
    async fn connect(&self, info: &DatasourceInfo) -> crate::Result<MetricsClient>;
}

/// Factory handing out one shared API implementation for every region
///
/// Records the regions it was asked to connect to.
pub struct StaticClientFactory {
    api: Arc<dyn CloudWatchApi>,
    connections: Mutex<Vec<String>>,
}

impl StaticClientFactory {
    /// Wrap an API implementation
    pub fn new(api: Arc<dyn CloudWatchApi>) -> Self {
        Self {
            api,
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Regions connected to so far, in order
    pub fn connected_regions(&self) -> Vec<String> {
        self.connections.lock().clone()
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    async fn connect(&self, info: &DatasourceInfo) -> crate::Result<MetricsClient> {
        self.connections.lock().push(info.region.clone());
        Ok(MetricsClient::new(self.api.clone(), info.region.clone()))
    }
}

// ============================================================================
// Metrics Client
// ============================================================================

/// Region-bound CloudWatch client used by the query pipeline
#[derive(Clone)]
pub struct MetricsClient {
    api: Arc<dyn CloudWatchApi>,
    region: String,
}

impl MetricsClient {
    /// Bind an API implementation to a region
    pub fn new(api: Arc<dyn CloudWatchApi>, region: impl Into<String>) -> Self {
        Self {
            api,
            region: region.into(),
        }
    }

    /// Region this client talks to
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Fetch statistics for a query over `range`
    ///
    /// The window sent upstream is `range` shifted ten minutes earlier.
    pub async fn get_statistics(
        &self,
        query: &QueryDescriptor,
        range: TimeRange,
    ) -> Result<StatisticsResponse, UpstreamError> {
        let request = StatisticsRequest {
            namespace: query.namespace.clone(),
            metric_name: query.metric_name.clone(),
            dimensions: query.dimensions.clone(),
            statistics: query.statistics.clone(),
            extended_statistics: query.extended_statistics.clone(),
            period: query.period,
            range: range.shifted(-PUBLISH_DELAY_MS),
        };
        self.get_statistics_raw(&request).await
    }

    /// Fetch statistics exactly as requested, with no window shift
    pub async fn get_statistics_raw(
        &self,
        request: &StatisticsRequest,
    ) -> Result<StatisticsResponse, UpstreamError> {
        debug!(
            region = %self.region,
            namespace = %request.namespace,
            metric = %request.metric_name,
            range = %request.range,
            "GetMetricStatistics"
        );
        let result = self.api.get_metric_statistics(request).await;
        observe("GetMetricStatistics", &result);
        result
    }

    /// Every metric of a namespace, following pagination to the last page
    pub async fn list_all_metrics(
        &self,
        namespace: &str,
    ) -> Result<Vec<MetricDescriptor>, UpstreamError> {
        let mut request = ListMetricsRequest::namespace(namespace);
        let mut metrics = Vec::new();
        let mut pages = 0usize;

        loop {
            let page = self.list_metrics_page(&request).await?;
            pages += 1;
            metrics.extend(page.metrics);

            match page.next_token {
                Some(token) if !token.is_empty() => request.next_token = Some(token),
                _ => break,
            }
        }

        debug!(
            region = %self.region,
            namespace,
            pages,
            metrics = metrics.len(),
            "Listed all metrics"
        );
        Ok(metrics)
    }

    /// One ListMetrics page
    pub async fn list_metrics_page(
        &self,
        request: &ListMetricsRequest,
    ) -> Result<ListMetricsPage, UpstreamError> {
        let result = self.api.list_metrics(request).await;
        observe("ListMetrics", &result);
        if result.is_ok() {
            metrics::record_list_metrics_page(&request.namespace);
        }
        result
    }

    /// Alarms matching a filter
    pub async fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<MetricAlarm>, UpstreamError> {
        let operation = match filter {
            AlarmFilter::Prefix { .. } => "DescribeAlarms",
            AlarmFilter::Metric { .. } => "DescribeAlarmsForMetric",
        };
        let result = self.api.describe_alarms(filter).await;
        observe(operation, &result);
        result
    }

    /// History of one alarm within a window
    pub async fn alarm_history(
        &self,
        alarm_name: &str,
        history_item_type: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<AlarmHistoryItem>, UpstreamError> {
        let result = self
            .api
            .describe_alarm_history(alarm_name, history_item_type, range)
            .await;
        observe("DescribeAlarmHistory", &result);
        result
    }
}

fn observe<T>(operation: &str, result: &Result<T, UpstreamError>) {
    metrics::record_api_call(operation, result.is_ok());
    if let Err(e) = result {
        warn!(operation, error = %e, "CloudWatch call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::stubs::{InMemoryCloudWatch, RecordedCall};
    use super::*;
    use crate::query::parse_query;
    use crate::types::Dimension;
    use serde_json::json;

    fn metric(name: &str) -> MetricDescriptor {
        MetricDescriptor {
            namespace: "Custom/App".to_string(),
            metric_name: name.to_string(),
            dimensions: vec![Dimension::new("Host", "a")],
        }
    }

    #[tokio::test]
    async fn test_statistics_window_shifted_ten_minutes() {
        let api = Arc::new(InMemoryCloudWatch::new());
        let client = MetricsClient::new(api.clone(), "us-east-1");
        let query = parse_query(&json!({
            "region": "us-east-1",
            "namespace": "AWS/EC2",
            "metricName": "CPUUtilization",
            "statistics": ["Average"]
        }))
        .unwrap();

        let range = TimeRange::new(3_600_000, 7_200_000).unwrap();
        client.get_statistics(&query, range).await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            RecordedCall::GetMetricStatistics(request) => {
                assert_eq!(request.range.start, 3_000_000);
                assert_eq!(request.range.end, 6_600_000);
                assert_eq!(request.period, 300);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_all_metrics_follows_pagination() {
        let api = Arc::new(InMemoryCloudWatch::new().with_metric_pages(
            "Custom/App",
            vec![
                vec![metric("Latency"), metric("Errors")],
                vec![metric("Requests")],
                vec![metric("Latency")],
            ],
        ));
        let client = MetricsClient::new(api.clone(), "us-east-1");

        let metrics = client.list_all_metrics("Custom/App").await.unwrap();
        let names: Vec<&str> = metrics.iter().map(|m| m.metric_name.as_str()).collect();
        assert_eq!(names, vec!["Latency", "Errors", "Requests", "Latency"]);
        assert_eq!(api.call_count("ListMetrics"), 3);
    }

    #[tokio::test]
    async fn test_failure_is_not_retried() {
        let api = Arc::new(InMemoryCloudWatch::new());
        api.fail_operation("ListMetrics");
        let client = MetricsClient::new(api.clone(), "us-east-1");

        let err = client.list_all_metrics("Custom/App").await.unwrap_err();
        assert_eq!(err.operation, "ListMetrics");
        assert_eq!(api.call_count("ListMetrics"), 1);
    }

    #[tokio::test]
    async fn test_static_factory_binds_region() {
        let factory = StaticClientFactory::new(Arc::new(InMemoryCloudWatch::new()));
        let client = factory
            .connect(&DatasourceInfo::new("default", "eu-west-1"))
            .await
            .unwrap();
        assert_eq!(client.region(), "eu-west-1");
        assert_eq!(factory.connected_regions(), vec!["eu-west-1"]);
    }
}
