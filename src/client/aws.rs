//! AWS SDK backend
//!
//! Resolves credentials from the datasource's profile, static key pair or
//! assumed role, and maps the SDK's request/response types onto the crate's
//! own.

use super::{ClientFactory, CloudWatchApi, MetricsClient};
use crate::error::UpstreamError;
use crate::types::{
    self, AlarmFilter, AlarmHistoryItem, DatasourceInfo, ListMetricsPage, ListMetricsRequest,
    MetricAlarm, MetricDescriptor, Statistic, StatisticsRequest, StatisticsResponse, TimeRange,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::Credentials;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types as sdk;
use aws_sdk_cloudwatch::Client;
use std::sync::Arc;
use tracing::debug;

const SESSION_NAME: &str = "kuba-cloudwatch";

/// Connects to CloudWatch through the AWS SDK
#[derive(Debug, Default, Clone)]
pub struct AwsClientFactory;

impl AwsClientFactory {
    /// Create a factory
    pub fn new() -> Self {
        Self
    }

    async fn sdk_client(&self, info: &DatasourceInfo) -> Client {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(info.region.clone()));

        if !info.profile.is_empty() {
            loader = loader.profile_name(&info.profile);
        }
        if let (Some(access_key), Some(secret_key)) = (&info.access_key, &info.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                SESSION_NAME,
            ));
        }

        let base = loader.load().await;
        let mut builder = aws_sdk_cloudwatch::config::Builder::from(&base);

        if let Some(role_arn) = info.assume_role_arn.as_deref().filter(|arn| !arn.is_empty()) {
            debug!(role_arn, "Assuming role for CloudWatch access");
            let provider = aws_config::sts::AssumeRoleProvider::builder(role_arn)
                .session_name(SESSION_NAME)
                .configure(&base)
                .build()
                .await;
            builder = builder.credentials_provider(provider);
        }

        Client::from_conf(builder.build())
    }
}

#[async_trait]
impl ClientFactory for AwsClientFactory {
    async fn connect(&self, info: &DatasourceInfo) -> crate::Result<MetricsClient> {
        let client = self.sdk_client(info).await;
        Ok(MetricsClient::new(
            Arc::new(AwsCloudWatch { client }),
            info.region.clone(),
        ))
    }
}

/// [`CloudWatchApi`] over an SDK client
pub struct AwsCloudWatch {
    client: Client,
}

impl AwsCloudWatch {
    /// Wrap an SDK client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CloudWatchApi for AwsCloudWatch {
    async fn get_metric_statistics(
        &self,
        request: &StatisticsRequest,
    ) -> Result<StatisticsResponse, UpstreamError> {
        let mut call = self
            .client
            .get_metric_statistics()
            .namespace(&request.namespace)
            .metric_name(&request.metric_name)
            .set_dimensions(Some(to_sdk_dimensions(&request.dimensions)))
            .start_time(AwsDateTime::from_millis(request.range.start))
            .end_time(AwsDateTime::from_millis(request.range.end))
            .period(api_int("GetMetricStatistics", "period", request.period)?);

        if !request.statistics.is_empty() {
            call = call.set_statistics(Some(
                request
                    .statistics
                    .iter()
                    .map(|s| sdk::Statistic::from(s.as_str()))
                    .collect(),
            ));
        }
        if !request.extended_statistics.is_empty() {
            call = call.set_extended_statistics(Some(request.extended_statistics.clone()));
        }

        let output = call
            .send()
            .await
            .map_err(|e| UpstreamError::new("GetMetricStatistics", e))?;

        let datapoints = output
            .datapoints()
            .iter()
            .filter_map(|dp| {
                let timestamp = dp.timestamp()?.to_millis().ok()?;
                Some(types::Datapoint {
                    timestamp,
                    average: dp.average(),
                    maximum: dp.maximum(),
                    minimum: dp.minimum(),
                    sum: dp.sum(),
                    sample_count: dp.sample_count(),
                    extended_statistics: dp.extended_statistics().cloned().unwrap_or_default(),
                    unit: dp.unit().map(|u| u.as_str().to_string()),
                })
            })
            .collect();

        Ok(StatisticsResponse {
            label: output.label().map(str::to_string),
            datapoints,
        })
    }

    async fn list_metrics(
        &self,
        request: &ListMetricsRequest,
    ) -> Result<ListMetricsPage, UpstreamError> {
        let filters: Vec<sdk::DimensionFilter> = request
            .dimensions
            .iter()
            .map(|f| {
                sdk::DimensionFilter::builder()
                    .name(&f.name)
                    .set_value(f.value.clone())
                    .build()
            })
            .collect();

        let output = self
            .client
            .list_metrics()
            .namespace(&request.namespace)
            .set_metric_name(request.metric_name.clone())
            .set_dimensions((!filters.is_empty()).then_some(filters))
            .set_next_token(request.next_token.clone())
            .send()
            .await
            .map_err(|e| UpstreamError::new("ListMetrics", e))?;

        let metrics = output
            .metrics()
            .iter()
            .map(|m| MetricDescriptor {
                namespace: m.namespace().unwrap_or_default().to_string(),
                metric_name: m.metric_name().unwrap_or_default().to_string(),
                dimensions: from_sdk_dimensions(m.dimensions()),
            })
            .collect();

        Ok(ListMetricsPage {
            metrics,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn describe_alarms(
        &self,
        filter: &AlarmFilter,
    ) -> Result<Vec<MetricAlarm>, UpstreamError> {
        let alarms = match filter {
            AlarmFilter::Prefix {
                action_prefix,
                alarm_name_prefix,
                max_records,
            } => self
                .client
                .describe_alarms()
                .set_action_prefix(non_empty(action_prefix))
                .set_alarm_name_prefix(non_empty(alarm_name_prefix))
                .max_records(api_int("DescribeAlarms", "max_records", *max_records)?)
                .send()
                .await
                .map_err(|e| UpstreamError::new("DescribeAlarms", e))?
                .metric_alarms()
                .iter()
                .map(from_sdk_alarm)
                .collect(),
            AlarmFilter::Metric {
                namespace,
                metric_name,
                dimensions,
                statistic,
                period,
            } => {
                let mut call = self
                    .client
                    .describe_alarms_for_metric()
                    .namespace(namespace)
                    .metric_name(metric_name)
                    .set_period(
                        period
                            .map(|p| api_int("DescribeAlarmsForMetric", "period", p))
                            .transpose()?,
                    );
                if !dimensions.is_empty() {
                    call = call.set_dimensions(Some(to_sdk_dimensions(dimensions)));
                }
                call = match statistic {
                    Some(Statistic::Extended(name)) => call.extended_statistic(name),
                    Some(standard) => call.statistic(sdk::Statistic::from(standard.as_str())),
                    None => call,
                };
                call.send()
                    .await
                    .map_err(|e| UpstreamError::new("DescribeAlarmsForMetric", e))?
                    .metric_alarms()
                    .iter()
                    .map(from_sdk_alarm)
                    .collect()
            }
        };
        Ok(alarms)
    }

    async fn describe_alarm_history(
        &self,
        alarm_name: &str,
        history_item_type: Option<&str>,
        range: TimeRange,
    ) -> Result<Vec<AlarmHistoryItem>, UpstreamError> {
        let output = self
            .client
            .describe_alarm_history()
            .alarm_name(alarm_name)
            .set_history_item_type(history_item_type.map(sdk::HistoryItemType::from))
            .start_date(AwsDateTime::from_millis(range.start))
            .end_date(AwsDateTime::from_millis(range.end))
            .send()
            .await
            .map_err(|e| UpstreamError::new("DescribeAlarmHistory", e))?;

        Ok(output
            .alarm_history_items()
            .iter()
            .filter_map(|item| {
                Some(AlarmHistoryItem {
                    alarm_name: item.alarm_name().unwrap_or(alarm_name).to_string(),
                    timestamp: item.timestamp()?.to_millis().ok()?,
                    history_item_type: item
                        .history_item_type()
                        .map(|t| t.as_str().to_string())
                        .unwrap_or_default(),
                    history_summary: item.history_summary().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Narrow to the SDK's `i32` fields, failing instead of wrapping
fn api_int(operation: &'static str, field: &str, value: u32) -> Result<i32, UpstreamError> {
    i32::try_from(value).map_err(|_| {
        UpstreamError::new(
            operation,
            format!("{} {} exceeds the API limit of {}", field, value, i32::MAX),
        )
    })
}

fn to_sdk_dimensions(dimensions: &[types::Dimension]) -> Vec<sdk::Dimension> {
    dimensions
        .iter()
        .map(|d| sdk::Dimension::builder().name(&d.name).value(&d.value).build())
        .collect()
}

fn from_sdk_dimensions(dimensions: &[sdk::Dimension]) -> Vec<types::Dimension> {
    dimensions
        .iter()
        .map(|d| {
            types::Dimension::new(
                d.name().unwrap_or_default(),
                d.value().unwrap_or_default(),
            )
        })
        .collect()
}

fn from_sdk_alarm(alarm: &sdk::MetricAlarm) -> MetricAlarm {
    let statistic = alarm
        .statistic()
        .map(|s| Statistic::parse(s.as_str()))
        .or_else(|| alarm.extended_statistic().map(Statistic::parse));

    MetricAlarm {
        alarm_name: alarm.alarm_name().unwrap_or_default().to_string(),
        namespace: alarm.namespace().map(str::to_string),
        metric_name: alarm.metric_name().map(str::to_string),
        dimensions: from_sdk_dimensions(alarm.dimensions()),
        statistic,
        period: alarm.period().and_then(|p| u32::try_from(p).ok()),
        alarm_actions: alarm.alarm_actions().to_vec(),
    }
}
