use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Declarative description of which metrics exist, as
/// `group → metric → definition`.
///
/// Top-level entries whose value is not an object carry no metrics and are
/// skipped when flattening.
///
/// # Examples
///
/// ```
/// use oxmetric_common::schema::MetricSchema;
///
/// let schema = MetricSchema::from_value(serde_json::json!({
///     "cpu": {"utilization": {"unit": "%"}},
///     "status": "active"
/// }))
/// .unwrap();
/// assert_eq!(schema.flatten_keys(), vec!["cpu.utilization"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSchema(Map<String, Value>);

impl MetricSchema {
    /// Returns `None` unless `value` is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Metric keys as `"group.metric"`, in declaration order.
    pub fn flatten_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for (group, metrics) in &self.0 {
            if let Value::Object(metrics) = metrics {
                for metric in metrics.keys() {
                    keys.push(format!("{group}.{metric}"));
                }
            }
        }
        keys
    }

    pub fn contains_key(&self, key: &str) -> bool {
        split_key(key)
            .and_then(|(group, metric)| self.0.get(group)?.as_object()?.get(metric))
            .is_some()
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Metrics collected for `inventory.Server`.
    pub fn server_default() -> Self {
        let schema = json!({
            "cpu": {
                "utilization": {"name": "CPU Utilization", "unit": "Percent"}
            },
            "memory": {
                "usage": {"name": "Memory Usage", "unit": "Percent"},
                "total": {"name": "Memory Total", "unit": "Bytes"},
                "used": {"name": "Memory Used", "unit": "Bytes"}
            },
            "disk": {
                "write_iops": {"name": "Disk Write IOPS", "unit": "Count"},
                "read_iops": {"name": "Disk Read IOPS", "unit": "Count"},
                "write_throughput": {"name": "Disk Write Throughput", "unit": "Bytes"},
                "read_throughput": {"name": "Disk Read Throughput", "unit": "Bytes"}
            },
            "network": {
                "received_throughput": {"name": "Network In Throughput", "unit": "Bytes"},
                "received_pps": {"name": "Network In PPS", "unit": "Count"},
                "sent_throughput": {"name": "Network Out Throughput", "unit": "Bytes"},
                "sent_pps": {"name": "Network Out PPS", "unit": "Count"}
            }
        });
        Self::from_value(schema).unwrap_or_default()
    }
}

/// Splits `"group.metric"` at the first dot.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('.')
}

/// What to collect: the schema itself plus its flattened keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    pub json: MetricSchema,
    pub key: Vec<String>,
}

impl From<MetricSchema> for MetricInfo {
    fn from(schema: MetricSchema) -> Self {
        let key = schema.flatten_keys();
        Self { json: schema, key }
    }
}
