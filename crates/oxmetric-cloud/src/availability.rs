use crate::MetricBackend;
use anyhow::Result;
use std::collections::HashSet;

/// Narrows `candidate_ids` to the ones the backend reports as queryable.
///
/// The result keeps candidate order and never contains an id that was not
/// a candidate, whatever the backend answers. An empty candidate list is
/// answered without calling the backend.
pub async fn filter_available(
    backend: &dyn MetricBackend,
    resource_type: &str,
    candidate_ids: &[String],
) -> Result<Vec<String>> {
    if candidate_ids.is_empty() {
        return Ok(Vec::new());
    }

    let reported = backend
        .check_availability(resource_type, candidate_ids)
        .await?
        .available_resources;
    let reported: HashSet<&str> = reported.iter().map(String::as_str).collect();

    let available: Vec<String> = candidate_ids
        .iter()
        .filter(|id| reported.contains(id.as_str()))
        .cloned()
        .collect();

    tracing::info!(
        provider = %backend.provider(),
        candidates = candidate_ids.len(),
        available = available.len(),
        "Checked metric availability"
    );
    Ok(available)
}
