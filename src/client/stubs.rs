//! In-memory CloudWatch stub
//!
//! [`InMemoryCloudWatch`] answers every [`CloudWatchApi`] call from canned
//! data and records each call it receives. Intended for unit and integration
//! tests and for running the datasource without AWS credentials.
//!
//! - statistics responses are keyed by metric name
//! - ListMetrics pages are served in order with `page-<n>` continuation tokens
//! - alarm filters are evaluated against the stored alarms the way the service
//!   evaluates them
//! - any operation can be made to fail, and every call can be delayed
//!
//! # Example
//!
//! ```rust
//! use kuba_cloudwatch::client::stubs::InMemoryCloudWatch;
//! use kuba_cloudwatch::types::MetricDescriptor;
//!
//! let api = InMemoryCloudWatch::new().with_metric_pages(
//!     "Custom/App",
//!     vec![vec![MetricDescriptor {
//!         namespace: "Custom/App".to_string(),
//!         metric_name: "Latency".to_string(),
//!         dimensions: vec![],
//!     }]],
//! );
//! assert_eq!(api.call_count("ListMetrics"), 0);
//! ```

use super::CloudWatchApi;
use crate::error::UpstreamError;
use crate::types::{
    AlarmFilter, AlarmHistoryItem, ListMetricsPage, ListMetricsRequest, MetricAlarm,
    MetricDescriptor, StatisticsRequest, StatisticsResponse, TimeRange,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// A call received by the stub
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// GetMetricStatistics
    GetMetricStatistics(StatisticsRequest),
    /// ListMetrics
    ListMetrics(ListMetricsRequest),
    /// DescribeAlarms / DescribeAlarmsForMetric
    DescribeAlarms(AlarmFilter),
    /// DescribeAlarmHistory
    DescribeAlarmHistory {
        /// Alarm name
        alarm_name: String,
        /// History item type filter
        history_item_type: Option<String>,
        /// Window
        range: TimeRange,
    },
}

impl RecordedCall {
    /// API operation name of the call
    pub fn operation(&self) -> &'static str {
        match self {
            RecordedCall::GetMetricStatistics(_) => "GetMetricStatistics",
            RecordedCall::ListMetrics(_) => "ListMetrics",
            RecordedCall::DescribeAlarms(AlarmFilter::Prefix { .. }) => "DescribeAlarms",
            RecordedCall::DescribeAlarms(AlarmFilter::Metric { .. }) => "DescribeAlarmsForMetric",
            RecordedCall::DescribeAlarmHistory { .. } => "DescribeAlarmHistory",
        }
    }
}

/// In-memory [`CloudWatchApi`] implementation
#[derive(Default)]
pub struct InMemoryCloudWatch {
    statistics: HashMap<String, StatisticsResponse>,
    metric_pages: HashMap<String, Vec<Vec<MetricDescriptor>>>,
    alarms: Vec<MetricAlarm>,
    history: Vec<AlarmHistoryItem>,
    delay: Mutex<Option<Duration>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl InMemoryCloudWatch {
    /// Create an empty stub
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer GetMetricStatistics for `metric_name` with `response`
    pub fn with_statistics(
        mut self,
        metric_name: impl Into<String>,
        response: StatisticsResponse,
    ) -> Self {
        self.statistics.insert(metric_name.into(), response);
        self
    }

    /// Serve ListMetrics for `namespace` as the given pages
    pub fn with_metric_pages(
        mut self,
        namespace: impl Into<String>,
        pages: Vec<Vec<MetricDescriptor>>,
    ) -> Self {
        self.metric_pages.insert(namespace.into(), pages);
        self
    }

    /// Add an alarm
    pub fn with_alarm(mut self, alarm: MetricAlarm) -> Self {
        self.alarms.push(alarm);
        self
    }

    /// Add an alarm history item
    pub fn with_history(mut self, item: AlarmHistoryItem) -> Self {
        self.history.push(item);
        self
    }

    /// Sleep for `delay` before answering every call
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    /// Change the delay for calls that arrive from now on
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Make every later call of `operation` fail
    pub fn fail_operation(&self, operation: &str) {
        self.failing.lock().insert(operation.to_string());
    }

    /// Let every operation succeed again
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received for `operation`
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    async fn enter(&self, call: RecordedCall) -> Result<(), UpstreamError> {
        let operation = call.operation();
        self.calls.lock().push(call);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(operation) {
            return Err(UpstreamError::new(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl CloudWatchApi for InMemoryCloudWatch {
    async fn get_metric_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> Result<StatisticsResponse, UpstreamError> {
        self.enter(RecordedCall::GetMetricStatistics(request.clone()))
            .await?;

        Ok(self
            .statistics
            .get(&request.metric_name)
            .cloned()
            .unwrap_or_else(|| StatisticsResponse {
                label: Some(request.metric_name.clone()),
                datapoints: Vec::new(),
            }))
    }

    async fn list_metrics(
        &self,
        request: &ListMetricsRequest,
    ) -> Result<ListMetricsPage, UpstreamError> {
        self.enter(RecordedCall::ListMetrics(request.clone())).await?;

        let pages = match self.metric_pages.get(&request.namespace) {
            Some(pages) => pages,
            None => return Ok(ListMetricsPage::default()),
        };

        let index = match &request.next_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| UpstreamError::new("ListMetrics", "invalid NextToken"))?,
        };

        let metrics = pages
            .get(index)
            .map(|page| {
                page.iter()
                    .filter(|m| matches_list_request(m, request))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let next_token = if index + 1 < pages.len() {
            Some(format!("page-{}", index + 1))
        } else {
            None
        };

        Ok(ListMetricsPage {
            metrics,
            next_token,
        })
    }

    async fn describe_alarms(
        &self,
        filter: &AlarmFilter,
    ) -> Result<Vec<MetricAlarm>, UpstreamError> {
        self.enter(RecordedCall::DescribeAlarms(filter.clone()))
            .await?;

        let alarms = match filter {
            AlarmFilter::Prefix {
                action_prefix,
                alarm_name_prefix,
                max_records,
            } => self
                .alarms
                .iter()
                .filter(|a| a.alarm_name.starts_with(alarm_name_prefix.as_str()))
                .filter(|a| {
                    action_prefix.is_empty()
                        || a.alarm_actions
                            .iter()
                            .any(|action| action.starts_with(action_prefix.as_str()))
                })
                .take(*max_records as usize)
                .cloned()
                .collect(),
            AlarmFilter::Metric {
                namespace,
                metric_name,
                dimensions,
                statistic,
                period,
            } => self
                .alarms
                .iter()
                .filter(|a| a.namespace.as_deref() == Some(namespace.as_str()))
                .filter(|a| a.metric_name.as_deref() == Some(metric_name.as_str()))
                .filter(|a| statistic.is_none() || a.statistic == *statistic)
                .filter(|a| period.is_none() || a.period == *period)
                .filter(|a| {
                    dimensions.is_empty()
                        || (a.dimensions.len() == dimensions.len()
                            && dimensions.iter().all(|d| a.dimensions.contains(d)))
                })
                .cloned()
                .collect(),
        };
        Ok(alarms)
    }

    async fn describe_alarm_history(
        &self,
        alarm_name: &str,
        history_item_type: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<AlarmHistoryItem>, UpstreamError> {
        self.enter(RecordedCall::DescribeAlarmHistory {
            alarm_name: alarm_name.to_string(),
            history_item_type: history_item_type.map(str::to_string),
            range,
        })
        .await?;

        Ok(self
            .history
            .iter()
            .filter(|item| item.alarm_name == alarm_name)
            .filter(|item| history_item_type.map_or(true, |t| item.history_item_type == t))
            .filter(|item| range.contains(item.timestamp))
            .cloned()
            .collect())
    }
}

fn matches_list_request(metric: &MetricDescriptor, request: &ListMetricsRequest) -> bool {
    if let Some(name) = &request.metric_name {
        if &metric.metric_name != name {
            return false;
        }
    }
    request.dimensions.iter().all(|filter| {
        metric.dimensions.iter().any(|d| {
            d.name == filter.name && filter.value.as_ref().map_or(true, |v| &d.value == v)
        })
    })
}
