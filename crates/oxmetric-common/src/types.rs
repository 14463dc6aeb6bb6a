use crate::schema::{split_key, MetricSchema};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Resource types this collector can attach monitoring data to.
pub const SUPPORTED_RESOURCE_TYPES: [&str; 2] = ["inventory.Server", "inventory.CloudService"];

/// Default resource type for availability checks and output records.
pub const SERVER_RESOURCE_TYPE: &str = "inventory.Server";

/// Cloud vendor a resource belongs to.
///
/// Any tag outside the supported set deserializes to [`Provider::Unknown`],
/// so a malformed inventory record still lands in a grouping bucket.
///
/// # Examples
///
/// ```
/// use oxmetric_common::types::Provider;
///
/// let p: Provider = "google_cloud".parse().unwrap();
/// assert_eq!(p, Provider::GoogleCloud);
/// assert_eq!(p.to_string(), "google_cloud");
/// assert!(Provider::Aws.region_filter());
/// assert!(!Provider::Azure.region_filter());
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Aws,
    Azure,
    GoogleCloud,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Provider {
    /// Providers the collector knows how to query.
    pub const SUPPORTED: [Provider; 3] = [Provider::Aws, Provider::Azure, Provider::GoogleCloud];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::GoogleCloud => "google_cloud",
            Provider::Unknown => "unknown",
        }
    }

    /// Built-in region qualification: AWS connections are made per region,
    /// so its accounts are grouped per region too.
    pub fn region_filter(self) -> bool {
        matches!(self, Provider::Aws)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "google_cloud" => Ok(Provider::GoogleCloud),
            _ => Err(format!("unknown provider: {s}")),
        }
    }
}

/// A server as listed by inventory.
///
/// Only the fields the collector reads are typed; everything else is kept
/// verbatim in `extra`. Typed fields holding `null` or a value of the wrong
/// shape fall back to their empty form instead of failing the whole list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default, deserialize_with = "lenient_provider")]
    pub provider: Provider,
    #[serde(default, deserialize_with = "lenient_id")]
    pub server_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub region_code: Option<String>,
    #[serde(default)]
    pub data: ResourceData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceData {
    #[serde(default)]
    pub compute: ComputeInfo,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeInfo {
    /// Billing/account identity (`data.compute.account`).
    #[serde(default, deserialize_with = "lenient_string")]
    pub account: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient_provider<'de, D: Deserializer<'de>>(d: D) -> Result<Provider, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => Provider::Unknown,
    })
}

fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(lenient_string(d)?.unwrap_or_default())
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl ResourceRecord {
    pub fn new(provider: Provider, server_id: &str, region_code: Option<&str>, account: Option<&str>) -> Self {
        Self {
            provider,
            server_id: server_id.to_string(),
            region_code: region_code.map(str::to_string),
            data: ResourceData {
                compute: ComputeInfo {
                    account: account.map(str::to_string),
                    extra: Map::new(),
                },
                extra: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn account(&self) -> Option<&str> {
        self.data.compute.account.as_deref()
    }
}

/// Data source as reported by the monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    #[serde(default)]
    pub provider: Provider,
    pub name: String,
    pub data_source_id: String,
}

/// Per-provider reference to a data source, without the provider tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceRef {
    pub name: String,
    pub data_source_id: String,
}

/// Backend answer to "which of these ids can be queried right now".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    #[serde(default)]
    pub available_resources: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Samples of one metric key for one resource.
pub type MetricSeries = Vec<MetricSample>;

/// Metric key (`"group.metric"`) to its samples, for one resource.
pub type ServerMetrics = HashMap<String, MetricSeries>;

/// Resource id to its fetched metrics.
pub type MonitoringData = HashMap<String, ServerMetrics>;

/// Observation window shared by every provider in a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectionWindow {
    /// Window of `length` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: end - length,
            end,
        }
    }
}

/// Reduced value of one metric over the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

impl MetricStats {
    /// Samples with a non-finite value are ignored.
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        let values: Vec<f64> = samples
            .iter()
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return Self::default();
        }
        let sum: f64 = values.iter().sum();
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        Self {
            avg: Some(sum / values.len() as f64),
            max: Some(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.avg.is_none() && self.max.is_none()
    }

    pub fn to_value(self) -> Value {
        json!({"avg": self.avg, "max": self.max})
    }
}

/// `group → metric → stats`, e.g. `cpu → utilization → {avg, max}`.
///
/// Groups and metrics keep the order the schema declares them in.
pub type Monitoring = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringPayload {
    pub monitoring: Monitoring,
}

/// Output record: one per server reaching the merge stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredServer {
    pub resource_type: String,
    pub provider: Provider,
    pub server_id: String,
    pub region_code: Option<String>,
    pub account: Option<String>,
    pub data: MonitoringPayload,
}

impl MonitoredServer {
    /// Builds a `resource_type` record with every schema key present and empty.
    pub fn empty(record: &ResourceRecord, schema: &MetricSchema, resource_type: &str) -> Self {
        let mut out = Self {
            resource_type: resource_type.to_string(),
            provider: record.provider,
            server_id: record.server_id.clone(),
            region_code: record.region_code.clone(),
            account: record.account().map(str::to_string),
            data: MonitoringPayload::default(),
        };
        for key in schema.flatten_keys() {
            out.set_metric(&key, MetricStats::default());
        }
        out
    }

    pub fn metric(&self, key: &str) -> Option<MetricStats> {
        let (group, metric) = split_key(key)?;
        let value = self.data.monitoring.get(group)?.get(metric)?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Stores `stats` under a `"group.metric"` key. Keys without a group are ignored.
    pub fn set_metric(&mut self, key: &str, stats: MetricStats) {
        let Some((group, metric)) = split_key(key) else {
            return;
        };
        let slot = self
            .data
            .monitoring
            .entry(group)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(metrics) = slot {
            metrics.insert(metric.to_string(), stats.to_value());
        }
    }

    /// Plain JSON form handed back to the host.
    pub fn to_primitive(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(value: f64) -> MetricSample {
        MetricSample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            value,
        }
    }

    #[test]
    fn should_parse_nested_account_and_keep_unknown_fields() {
        let record: ResourceRecord = serde_json::from_value(serde_json::json!({
            "provider": "aws",
            "server_id": "server-1",
            "region_code": "us-east-1",
            "name": "web-01",
            "data": {"compute": {"account": "acc1", "instance_id": "i-1"}, "os": {"os_type": "LINUX"}}
        }))
        .unwrap();

        assert_eq!(record.provider, Provider::Aws);
        assert_eq!(record.account(), Some("acc1"));
        assert_eq!(record.extra.get("name"), Some(&serde_json::json!("web-01")));
        assert!(record.data.compute.extra.contains_key("instance_id"));
        assert!(record.data.extra.contains_key("os"));
    }

    #[test]
    fn should_map_missing_or_foreign_provider_to_unknown() {
        let missing: ResourceRecord =
            serde_json::from_value(serde_json::json!({"server_id": "s"})).unwrap();
        assert_eq!(missing.provider, Provider::Unknown);
        assert_eq!(missing.account(), None);

        let foreign: ResourceRecord =
            serde_json::from_value(serde_json::json!({"provider": "oracle", "server_id": "s"}))
                .unwrap();
        assert_eq!(foreign.provider, Provider::Unknown);
    }

    #[test]
    fn should_tolerate_null_and_mistyped_fields() {
        let records: Vec<ResourceRecord> = serde_json::from_value(serde_json::json!([
            {"provider": null, "server_id": "x-1", "data": {"compute": {"account": null}}},
            {"provider": 7, "server_id": null, "region_code": null},
            {"provider": "aws", "server_id": 42, "region_code": "us-east-1",
             "data": {"compute": {"account": 12345}}}
        ]))
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].provider, Provider::Unknown);
        assert_eq!(records[0].server_id, "x-1");
        assert_eq!(records[0].account(), None);
        assert_eq!(records[1].provider, Provider::Unknown);
        assert_eq!(records[1].server_id, "");
        assert_eq!(records[1].region_code, None);
        assert_eq!(records[2].provider, Provider::Aws);
        assert_eq!(records[2].server_id, "42");
        assert_eq!(records[2].account(), Some("12345"));
    }

    #[test]
    fn should_reject_unknown_provider_names_when_parsing() {
        assert!("oracle".parse::<Provider>().is_err());
        assert_eq!("AWS".parse::<Provider>().unwrap(), Provider::Aws);
    }

    #[test]
    fn should_reduce_samples_to_avg_and_max() {
        let stats = MetricStats::from_samples(&[sample(1.0), sample(3.0), sample(f64::NAN)]);
        assert_eq!(stats.avg, Some(2.0));
        assert_eq!(stats.max, Some(3.0));
        assert!(MetricStats::from_samples(&[]).is_empty());
    }

    #[test]
    fn should_build_empty_record_with_every_schema_key() {
        let schema = MetricSchema::server_default();
        let record = ResourceRecord::new(Provider::Azure, "vm-1", None, Some("sub-1"));
        let out = MonitoredServer::empty(&record, &schema, SERVER_RESOURCE_TYPE);

        for key in schema.flatten_keys() {
            assert_eq!(out.metric(&key), Some(MetricStats::default()), "{key}");
        }
        let json = out.to_primitive().unwrap();
        assert_eq!(json["provider"], "azure");
        assert_eq!(json["resource_type"], "inventory.Server");
        assert!(json["data"]["monitoring"]["cpu"]["utilization"]["avg"].is_null());
    }

    #[test]
    fn should_label_record_with_given_resource_type() {
        let record = ResourceRecord::new(Provider::Aws, "svc-1", None, None);
        let schema = MetricSchema::server_default();
        let out = MonitoredServer::empty(&record, &schema, "inventory.CloudService");
        assert_eq!(out.resource_type, "inventory.CloudService");
    }

    #[test]
    fn should_keep_schema_declaration_order_in_output() {
        let schema = MetricSchema::from_value(serde_json::json!({
            "network": {"received": {}, "sent": {}},
            "cpu": {"utilization": {}},
            "disk": {"write_iops": {}, "read_iops": {}}
        }))
        .unwrap();
        let record = ResourceRecord::new(Provider::Azure, "vm-1", None, None);
        let out = MonitoredServer::empty(&record, &schema, SERVER_RESOURCE_TYPE);

        let groups: Vec<&str> = out.data.monitoring.keys().map(String::as_str).collect();
        assert_eq!(groups, ["network", "cpu", "disk"]);
        let disk: Vec<&str> = out.data.monitoring["disk"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(disk, ["write_iops", "read_iops"]);
    }

    #[test]
    fn should_build_window_ending_at_given_instant() {
        let end = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let window = CollectionWindow::ending_at(end, Duration::days(1));
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.end, end);
    }
}
