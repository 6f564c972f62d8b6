//! Datasource action dispatch
//!
//! The host forwards `{region, action, parameters}` requests from the query
//! editor. Raw actions pass through to one CloudWatch call and answer in the
//! service's own (PascalCase) shape; the `__Get*` actions answer with sorted
//! suggestions. Raw timestamps are Unix seconds.

use crate::client::ClientFactory;
use crate::error::{Error, Result, UpstreamError};
use crate::metadata::MetadataService;
use crate::query::parser::MAX_PERIOD_SECS;
use crate::query::ExecutorConfig;
use crate::query::statistic::classify;
use crate::types::{
    AlarmFilter, DatasourceInfo, Dimension, DimensionFilter, ListMetricsRequest, Statistic,
    StatisticsRequest, TimeRange,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Inbound action request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Region (`default` or empty resolves to the datasource region)
    #[serde(default)]
    pub region: String,
    /// Action name
    pub action: String,
    /// Action parameters
    #[serde(default)]
    pub parameters: Value,
}

/// Supported actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Raw GetMetricStatistics
    GetMetricStatistics,
    /// Raw ListMetrics (one page)
    ListMetrics,
    /// Raw DescribeAlarmsForMetric
    DescribeAlarmsForMetric,
    /// Raw DescribeAlarmHistory
    DescribeAlarmHistory,
    /// Region suggestions
    GetRegions,
    /// Namespace suggestions
    GetNamespaces,
    /// Metric name suggestions
    GetMetrics,
    /// Dimension key suggestions
    GetDimensions,
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetMetricStatistics => "GetMetricStatistics",
            Action::ListMetrics => "ListMetrics",
            Action::DescribeAlarmsForMetric => "DescribeAlarmsForMetric",
            Action::DescribeAlarmHistory => "DescribeAlarmHistory",
            Action::GetRegions => "__GetRegions",
            Action::GetNamespaces => "__GetNamespaces",
            Action::GetMetrics => "__GetMetrics",
            Action::GetDimensions => "__GetDimensions",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "GetMetricStatistics" => Action::GetMetricStatistics,
            "ListMetrics" => Action::ListMetrics,
            "DescribeAlarmsForMetric" => Action::DescribeAlarmsForMetric,
            "DescribeAlarmHistory" => Action::DescribeAlarmHistory,
            "__GetRegions" => Action::GetRegions,
            "__GetNamespaces" => Action::GetNamespaces,
            "__GetMetrics" => Action::GetMetrics,
            "__GetDimensions" => Action::GetDimensions,
            other => {
                return Err(Error::InvalidRequest(format!(
                    "Unexpected AWS Action: {}",
                    other
                )))
            }
        })
    }
}

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StatisticsParams {
    namespace: String,
    metric_name: String,
    dimensions: Vec<Dimension>,
    statistics: Vec<String>,
    extended_statistics: Vec<String>,
    start_time: i64,
    end_time: i64,
    period: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListMetricsParams {
    namespace: String,
    metric_name: Option<String>,
    dimensions: Vec<DimensionFilter>,
    next_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AlarmsForMetricParams {
    namespace: String,
    metric_name: String,
    dimensions: Vec<Dimension>,
    statistic: String,
    period: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AlarmHistoryParams {
    alarm_name: String,
    history_item_type: String,
    start_date: i64,
    end_date: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NamespaceParams {
    namespace: String,
}

fn params<T: serde::de::DeserializeOwned + Default>(action: Action, value: &Value) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value.clone()).map_err(|e| {
        Error::InvalidRequest(format!("Invalid parameters for {}: {}", action, e))
    })
}

fn checked_period(period: u32) -> Result<u32> {
    if period == 0 || period > MAX_PERIOD_SECS {
        return Err(Error::InvalidRequest(format!(
            "Invalid period {}: must be between 1 and {} seconds",
            period, MAX_PERIOD_SECS
        )));
    }
    Ok(period)
}

fn range_from_secs(start: i64, end: i64) -> Result<TimeRange> {
    TimeRange::new(start.saturating_mul(1000), end.saturating_mul(1000))
        .map_err(Error::InvalidRequest)
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes action requests to CloudWatch calls or metadata suggestions
pub struct ActionDispatcher {
    base: DatasourceInfo,
    clients: Arc<dyn ClientFactory>,
    metadata: MetadataService,
    timeout: Duration,
}

impl ActionDispatcher {
    /// Create a dispatcher for a datasource
    pub fn new(
        base: DatasourceInfo,
        clients: Arc<dyn ClientFactory>,
        metadata: MetadataService,
    ) -> Self {
        Self {
            base,
            clients,
            metadata,
            timeout: ExecutorConfig::default().timeout,
        }
    }

    /// Bound every action, including discovery that holds the cache lock
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Metadata service backing the `__Get*` actions
    pub fn metadata(&self) -> &MetadataService {
        &self.metadata
    }

    /// Handle one action request
    pub async fn dispatch(&self, request: &ActionRequest) -> Result<Value> {
        let action: Action = request.action.parse()?;
        match tokio::time::timeout(self.timeout, self.run(action, request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(action = %action, timeout = ?self.timeout, "Action timed out");
                Err(UpstreamError::new(
                    action.as_str(),
                    format!("timed out after {:?}", self.timeout),
                )
                .into())
            }
        }
    }

    async fn run(&self, action: Action, request: &ActionRequest) -> Result<Value> {
        let info = self.base.for_request_region(&request.region);
        debug!(action = %action, region = %info.region, "Dispatching action");

        match action {
            Action::GetRegions => Ok(json!(self.metadata.regions())),
            Action::GetNamespaces => Ok(json!(self.metadata.namespaces())),
            Action::GetMetrics => {
                let p: NamespaceParams = params(action, &request.parameters)?;
                let items = self
                    .metadata
                    .metrics(&info.with_namespace(p.namespace), self.clients.as_ref())
                    .await?;
                Ok(json!(items))
            }
            Action::GetDimensions => {
                let p: NamespaceParams = params(action, &request.parameters)?;
                let items = self
                    .metadata
                    .dimension_keys(&info.with_namespace(p.namespace), self.clients.as_ref())
                    .await?;
                Ok(json!(items))
            }
            Action::GetMetricStatistics => {
                let p: StatisticsParams = params(action, &request.parameters)?;
                let mut classified = classify(&p.statistics);
                classified.extended.extend(p.extended_statistics);
                let statistics_request = StatisticsRequest {
                    namespace: p.namespace,
                    metric_name: p.metric_name,
                    dimensions: p.dimensions,
                    statistics: classified.standard,
                    extended_statistics: classified.extended,
                    period: checked_period(p.period)?,
                    range: range_from_secs(p.start_time, p.end_time)?,
                };
                let client = self.clients.connect(&info).await?;
                let response = client.get_statistics_raw(&statistics_request).await?;
                Ok(serde_json::to_value(response)?)
            }
            Action::ListMetrics => {
                let p: ListMetricsParams = params(action, &request.parameters)?;
                let client = self.clients.connect(&info).await?;
                let page = client
                    .list_metrics_page(&ListMetricsRequest {
                        namespace: p.namespace,
                        metric_name: p.metric_name.filter(|m| !m.is_empty()),
                        dimensions: p.dimensions,
                        next_token: p.next_token,
                    })
                    .await?;
                Ok(serde_json::to_value(page)?)
            }
            Action::DescribeAlarmsForMetric => {
                let p: AlarmsForMetricParams = params(action, &request.parameters)?;
                let client = self.clients.connect(&info).await?;
                let statistic = (!p.statistic.is_empty()).then(|| Statistic::parse(&p.statistic));
                let alarms = client
                    .list_alarms(&AlarmFilter::Metric {
                        namespace: p.namespace,
                        metric_name: p.metric_name,
                        dimensions: p.dimensions,
                        statistic,
                        period: p.period.map(checked_period).transpose()?,
                    })
                    .await?;
                Ok(json!({ "MetricAlarms": alarms }))
            }
            Action::DescribeAlarmHistory => {
                let p: AlarmHistoryParams = params(action, &request.parameters)?;
                let client = self.clients.connect(&info).await?;
                let item_type = Some(p.history_item_type.as_str()).filter(|t| !t.is_empty());
                let items = client
                    .alarm_history(
                        &p.alarm_name,
                        item_type,
                        range_from_secs(p.start_date, p.end_date)?,
                    )
                    .await?;
                Ok(json!({ "AlarmHistoryItems": items }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CustomMetricsCache, EntryState};
    use crate::catalog::StaticCatalog;
    use crate::client::stubs::{InMemoryCloudWatch, RecordedCall};
    use crate::client::StaticClientFactory;
    use crate::types::{AlarmHistoryItem, MetricAlarm, MetricDescriptor};

    fn dispatcher(api: Arc<InMemoryCloudWatch>) -> (ActionDispatcher, Arc<StaticClientFactory>) {
        let factory = Arc::new(StaticClientFactory::new(api));
        let metadata = MetadataService::new(
            StaticCatalog::embedded().unwrap(),
            Arc::new(CustomMetricsCache::new()),
            vec![],
        );
        (
            ActionDispatcher::new(
                DatasourceInfo::new("default", "us-east-1"),
                factory.clone(),
                metadata,
            ),
            factory,
        )
    }

    fn request(action: &str, parameters: Value) -> ActionRequest {
        ActionRequest {
            region: "default".to_string(),
            action: action.to_string(),
            parameters,
        }
    }

    #[test]
    fn test_action_names_round_trip() {
        for name in [
            "GetMetricStatistics",
            "ListMetrics",
            "DescribeAlarmsForMetric",
            "DescribeAlarmHistory",
            "__GetRegions",
            "__GetNamespaces",
            "__GetMetrics",
            "__GetDimensions",
        ] {
            assert_eq!(name.parse::<Action>().unwrap().as_str(), name);
        }
    }

    #[tokio::test]
    async fn test_unknown_action_rejected() {
        let (dispatcher, _) = dispatcher(Arc::new(InMemoryCloudWatch::new()));
        let err = dispatcher
            .dispatch(&request("DescribeInstances", Value::Null))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unexpected AWS Action"));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_raw_statistics_uses_seconds_and_no_shift() {
        let api = Arc::new(InMemoryCloudWatch::new());
        let (dispatcher, factory) = dispatcher(api.clone());

        let value = dispatcher
            .dispatch(&ActionRequest {
                region: "eu-west-1".to_string(),
                ..request(
                    "GetMetricStatistics",
                    json!({
                        "namespace": "AWS/EC2",
                        "metricName": "CPUUtilization",
                        "dimensions": [{ "Name": "InstanceId", "Value": "i-1" }],
                        "statistics": ["Average", "p99"],
                        "startTime": 1_000,
                        "endTime": 2_000,
                        "period": 60
                    }),
                )
            })
            .await
            .unwrap();

        assert_eq!(value["Label"], "CPUUtilization");
        assert_eq!(factory.connected_regions(), vec!["eu-west-1"]);
        match &api.calls()[0] {
            RecordedCall::GetMetricStatistics(r) => {
                assert_eq!(r.range, TimeRange::new(1_000_000, 2_000_000).unwrap());
                assert_eq!(r.dimensions, vec![Dimension::new("InstanceId", "i-1")]);
                assert_eq!(r.statistics, vec![Statistic::Average]);
                assert_eq!(r.extended_statistics, vec!["p99".to_string()]);
                assert!(r.statistics.iter().all(Statistic::is_standard));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raw_statistics_merges_extended_parameter() {
        let api = Arc::new(InMemoryCloudWatch::new());
        let (dispatcher, _) = dispatcher(api.clone());

        dispatcher
            .dispatch(&request(
                "GetMetricStatistics",
                json!({
                    "namespace": "AWS/ELB",
                    "metricName": "Latency",
                    "statistics": ["p50", "Sum"],
                    "extendedStatistics": ["p99.9"],
                    "startTime": 0,
                    "endTime": 60,
                    "period": 60
                }),
            ))
            .await
            .unwrap();

        match &api.calls()[0] {
            RecordedCall::GetMetricStatistics(r) => {
                assert_eq!(r.statistics, vec![Statistic::Sum]);
                assert_eq!(r.extended_statistics, vec!["p50", "p99.9"]);
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_raw_statistics_rejects_out_of_range_period() {
        let api = Arc::new(InMemoryCloudWatch::new());
        let (dispatcher, _) = dispatcher(api.clone());

        for period in [0u64, u64::from(u32::MAX)] {
            let err = dispatcher
                .dispatch(&request(
                    "GetMetricStatistics",
                    json!({
                        "namespace": "AWS/EC2",
                        "metricName": "CPUUtilization",
                        "statistics": ["Average"],
                        "startTime": 0,
                        "endTime": 60,
                        "period": period
                    }),
                ))
                .await
                .unwrap_err();
            assert_eq!(err.status_code(), 400);
        }
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_alarms_for_metric_omits_empty_statistic() {
        let api = Arc::new(InMemoryCloudWatch::new().with_alarm(MetricAlarm {
            alarm_name: "cpu".to_string(),
            namespace: Some("AWS/EC2".to_string()),
            metric_name: Some("CPUUtilization".to_string()),
            statistic: Some(Statistic::Average),
            period: Some(300),
            ..Default::default()
        }));
        let (dispatcher, _) = dispatcher(api.clone());

        let value = dispatcher
            .dispatch(&request(
                "DescribeAlarmsForMetric",
                json!({ "namespace": "AWS/EC2", "metricName": "CPUUtilization", "statistic": "" }),
            ))
            .await
            .unwrap();

        assert_eq!(value["MetricAlarms"][0]["AlarmName"], "cpu");
        match &api.calls()[0] {
            RecordedCall::DescribeAlarms(AlarmFilter::Metric { statistic, .. }) => {
                assert!(statistic.is_none())
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_alarm_history_item_type_filter() {
        let api = Arc::new(
            InMemoryCloudWatch::new()
                .with_history(AlarmHistoryItem {
                    alarm_name: "cpu".to_string(),
                    timestamp: 1_500_000,
                    history_item_type: "StateUpdate".to_string(),
                    history_summary: "OK to ALARM".to_string(),
                })
                .with_history(AlarmHistoryItem {
                    alarm_name: "cpu".to_string(),
                    timestamp: 1_600_000,
                    history_item_type: "Action".to_string(),
                    history_summary: "Published to SNS".to_string(),
                }),
        );
        let (dispatcher, _) = dispatcher(api);

        let value = dispatcher
            .dispatch(&request(
                "DescribeAlarmHistory",
                json!({ "alarmName": "cpu", "historyItemType": "Action", "startDate": 1_000, "endDate": 2_000 }),
            ))
            .await
            .unwrap();

        let items = value["AlarmHistoryItems"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["HistorySummary"], "Published to SNS");
    }

    #[tokio::test]
    async fn test_malformed_parameters() {
        let (dispatcher, _) = dispatcher(Arc::new(InMemoryCloudWatch::new()));
        let err = dispatcher
            .dispatch(&request("ListMetrics", json!({ "namespace": 5 })))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_suggestion_actions() {
        let (dispatcher, _) = dispatcher(Arc::new(InMemoryCloudWatch::new()));

        let regions = dispatcher
            .dispatch(&request("__GetRegions", Value::Null))
            .await
            .unwrap();
        assert_eq!(regions[0], json!({ "text": "ap-northeast-1", "value": "ap-northeast-1" }));

        let metrics = dispatcher
            .dispatch(&request("__GetMetrics", json!({ "namespace": "AWS/EC2" })))
            .await
            .unwrap();
        assert!(metrics
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["value"] == "CPUUtilization"));
    }

    fn custom_metric(namespace: &str, name: &str) -> MetricDescriptor {
        MetricDescriptor {
            namespace: namespace.to_string(),
            metric_name: name.to_string(),
            dimensions: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_discovery_times_out_and_releases_cache() {
        let api = Arc::new(
            InMemoryCloudWatch::new()
                .with_metric_pages("Custom/A", vec![vec![custom_metric("Custom/A", "Jobs")]])
                .with_metric_pages("Custom/B", vec![vec![custom_metric("Custom/B", "Orders")]])
                .with_delay(Duration::from_secs(3600)),
        );
        let (dispatcher, _) = dispatcher(api.clone());
        let dispatcher = Arc::new(dispatcher.with_timeout(Duration::from_secs(30)));

        let hung = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .dispatch(&request("__GetMetrics", json!({ "namespace": "Custom/A" })))
                    .await
            })
        };
        while api.call_count("ListMetrics") == 0 {
            tokio::task::yield_now().await;
        }

        // Only the first lookup hangs; the second waits on the cache lock
        api.set_delay(None);
        tokio::time::advance(Duration::from_secs(5)).await;

        let second = tokio::time::timeout(
            Duration::from_secs(120),
            dispatcher.dispatch(&request("__GetMetrics", json!({ "namespace": "Custom/B" }))),
        )
        .await
        .expect("second lookup stayed blocked");
        assert_eq!(second.unwrap(), json!([{ "text": "Orders", "value": "Orders" }]));

        let err = hung.await.unwrap().unwrap_err();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("timed out"));

        // The abandoned refresh wrote nothing
        let info = DatasourceInfo::new("default", "us-east-1").with_namespace("Custom/A");
        assert_eq!(
            dispatcher.metadata().cache().metric_name_cache().state(&info).await,
            EntryState::Uninitialized
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_raw_action_times_out() {
        let api = Arc::new(InMemoryCloudWatch::new().with_delay(Duration::from_secs(60)));
        let (dispatcher, _) = dispatcher(api);
        let dispatcher = dispatcher.with_timeout(Duration::from_secs(5));

        let err = dispatcher
            .dispatch(&request("ListMetrics", json!({ "namespace": "AWS/EC2" })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ListMetrics"));
        assert!(err.to_string().contains("timed out"));
    }
}
