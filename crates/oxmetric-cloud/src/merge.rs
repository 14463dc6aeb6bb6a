use oxmetric_common::schema::MetricSchema;
use oxmetric_common::types::{MetricStats, MonitoredServer, MonitoringData, ResourceRecord};

/// Attaches fetched metrics to each record, labelled with `resource_type`.
///
/// Produces exactly one output per input record, in input order. Records
/// without fetched data keep every schema metric empty. Fetched keys the
/// schema does not declare are ignored.
pub fn merge<'a, I>(
    schema: &MetricSchema,
    resource_type: &str,
    records: I,
    data: &MonitoringData,
) -> Vec<MonitoredServer>
where
    I: IntoIterator<Item = &'a ResourceRecord>,
{
    let keys = schema.flatten_keys();
    records
        .into_iter()
        .map(|record| {
            let mut out = MonitoredServer::empty(record, schema, resource_type);
            let Some(metrics) = data.get(&record.server_id) else {
                return out;
            };
            for key in &keys {
                if let Some(series) = metrics.get(key) {
                    out.set_metric(key, MetricStats::from_samples(series));
                }
            }
            out
        })
        .collect()
}
