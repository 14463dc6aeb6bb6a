use crate::availability::filter_available;
use crate::fetch::fetch;
use crate::grouping::{ProviderGroup, ResourceGroups};
use crate::merge::merge;
use crate::{BackendRegistry, MetricBackend, RegionFilter};
use anyhow::Result;
use futures::stream::{self, Stream};
use oxmetric_common::schema::MetricSchema;
use oxmetric_common::types::{
    CollectionWindow, MonitoredServer, ResourceRecord, SERVER_RESOURCE_TYPE,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Runs the per-provider pipeline for a whole collection cycle.
///
/// Providers are processed one at a time in registry order. A provider's
/// backend is only called once the caller has consumed every record of the
/// providers before it, and the first error ends the stream.
pub struct CollectionDriver {
    registry: BackendRegistry,
    region_filter: RegionFilter,
    resource_type: String,
}

impl CollectionDriver {
    pub fn new(registry: BackendRegistry, region_filter: RegionFilter) -> Self {
        Self {
            registry,
            region_filter,
            resource_type: SERVER_RESOURCE_TYPE.to_string(),
        }
    }

    pub fn with_resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = resource_type.to_string();
        self
    }

    /// Groups `resources` and returns the lazily evaluated output records.
    pub fn collect(
        self,
        resources: Vec<ResourceRecord>,
        schema: MetricSchema,
        window: CollectionWindow,
    ) -> impl Stream<Item = Result<MonitoredServer>> + Send + 'static {
        let groups = ResourceGroups::build(resources, &self.region_filter);
        tracing::info!(
            providers = ?groups.providers(),
            servers = groups.total_servers(),
            "Starting monitoring collection"
        );

        let run = Run {
            pending: self.registry.iter().cloned().collect(),
            ready: VecDeque::new(),
            groups,
            schema,
            window,
            resource_type: self.resource_type,
        };

        stream::try_unfold(run, |mut run| async move {
            loop {
                if let Some(record) = run.ready.pop_front() {
                    return Ok::<_, anyhow::Error>(Some((record, run)));
                }
                let Some(backend) = run.pending.pop_front() else {
                    return Ok(None);
                };
                let Some(group) = run.groups.get(backend.provider()) else {
                    tracing::debug!(provider = %backend.provider(), "No servers for provider, skipping");
                    continue;
                };
                let records = collect_provider(
                    backend.as_ref(),
                    group,
                    &run.schema,
                    &run.window,
                    &run.resource_type,
                )
                .await?;
                run.ready.extend(records);
            }
        })
    }
}

struct Run {
    pending: VecDeque<Arc<dyn MetricBackend>>,
    ready: VecDeque<MonitoredServer>,
    groups: ResourceGroups,
    schema: MetricSchema,
    window: CollectionWindow,
    resource_type: String,
}

/// Availability check, fetch and merge for one provider.
async fn collect_provider(
    backend: &dyn MetricBackend,
    group: &ProviderGroup,
    schema: &MetricSchema,
    window: &CollectionWindow,
    resource_type: &str,
) -> Result<Vec<MonitoredServer>> {
    let provider = backend.provider();
    let started = Instant::now();
    tracing::info!(
        provider = %provider,
        accounts = group.buckets().len(),
        servers = group.len(),
        "Provider monitoring collection started"
    );

    let candidates = group.server_ids();
    let available = filter_available(backend, resource_type, &candidates)
        .await
        .inspect_err(|e| tracing::error!(provider = %provider, error = %e, "Availability check failed"))?;
    let data = fetch(schema, backend, &available, window)
        .await
        .inspect_err(|e| tracing::error!(provider = %provider, error = %e, "Metric fetch failed"))?;
    let records = merge(schema, resource_type, group.records(), &data);

    tracing::info!(
        provider = %provider,
        records = records.len(),
        with_metrics = data.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Provider monitoring collection finished"
    );
    Ok(records)
}
