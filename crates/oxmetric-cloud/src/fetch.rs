use crate::MetricBackend;
use anyhow::Result;
use oxmetric_common::schema::MetricSchema;
use oxmetric_common::types::{CollectionWindow, MonitoringData};
use std::collections::HashSet;

/// Fetches metrics for `available_ids` over `window`.
///
/// No backend call is made for an empty id list. Entries for ids that were
/// not requested are dropped.
pub async fn fetch(
    schema: &MetricSchema,
    backend: &dyn MetricBackend,
    available_ids: &[String],
    window: &CollectionWindow,
) -> Result<MonitoringData> {
    let provider = backend.provider();
    if available_ids.is_empty() {
        tracing::info!(provider = %provider, "No available servers, skipping metric fetch");
        return Ok(MonitoringData::new());
    }

    let mut data = backend.query_metrics(schema, available_ids, window).await?;

    let requested: HashSet<&str> = available_ids.iter().map(String::as_str).collect();
    let returned = data.len();
    data.retain(|id, _| requested.contains(id.as_str()));
    if data.len() != returned {
        tracing::warn!(
            provider = %provider,
            dropped = returned - data.len(),
            "Backend returned metrics for servers that were not requested"
        );
    }

    tracing::debug!(provider = %provider, servers = data.len(), "Fetched metrics");
    Ok(data)
}
