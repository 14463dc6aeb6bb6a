//! Metric backend built on the monitoring service's data sources.

use crate::{BackendRegistry, MetricBackend};
use anyhow::Result;
use oxmetric_common::schema::MetricSchema;
use oxmetric_common::types::{
    AvailabilityResult, CollectionWindow, DataSourceInfo, DataSourceRef, MetricSeries,
    MonitoringData, Provider,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Monitoring service collaborator.
#[async_trait::async_trait]
pub trait MonitoringClient: Send + Sync {
    /// Lists every registered data source.
    async fn list_data_sources(&self) -> Result<Vec<DataSourceInfo>>;

    /// Reports which of `ids` the data source can serve metrics for.
    async fn list_metrics(
        &self,
        data_source_id: &str,
        resource_type: &str,
        ids: &[String],
    ) -> Result<AvailabilityResult>;

    /// Fetches samples of one metric key for `ids`, keyed by id.
    async fn get_metric_data(
        &self,
        data_source_id: &str,
        resource_type: &str,
        ids: &[String],
        metric_key: &str,
        window: &CollectionWindow,
    ) -> Result<HashMap<String, MetricSeries>>;
}

/// Groups data sources by provider, keeping listing order within each.
pub fn group_data_sources(
    data_sources: Vec<DataSourceInfo>,
) -> HashMap<Provider, Vec<DataSourceRef>> {
    let mut grouped: HashMap<Provider, Vec<DataSourceRef>> = HashMap::new();
    for ds in data_sources {
        grouped.entry(ds.provider).or_default().push(DataSourceRef {
            name: ds.name,
            data_source_id: ds.data_source_id,
        });
    }
    grouped
}

/// Answers for one provider by querying each of its data sources.
pub struct DataSourceBackend {
    provider: Provider,
    data_sources: Vec<DataSourceRef>,
    client: Arc<dyn MonitoringClient>,
    resource_type: String,
}

impl DataSourceBackend {
    pub fn new(
        provider: Provider,
        data_sources: Vec<DataSourceRef>,
        client: Arc<dyn MonitoringClient>,
        resource_type: &str,
    ) -> Self {
        Self {
            provider,
            data_sources,
            client,
            resource_type: resource_type.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl MetricBackend for DataSourceBackend {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn check_availability(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> Result<AvailabilityResult> {
        if self.data_sources.is_empty() {
            tracing::warn!(provider = %self.provider, "No data source registered for provider");
            return Ok(AvailabilityResult::default());
        }

        let mut seen = HashSet::new();
        let mut available_resources = Vec::new();
        for ds in &self.data_sources {
            let result = self
                .client
                .list_metrics(&ds.data_source_id, resource_type, ids)
                .await?;
            for id in result.available_resources {
                if seen.insert(id.clone()) {
                    available_resources.push(id);
                }
            }
        }
        Ok(AvailabilityResult {
            available_resources,
        })
    }

    async fn query_metrics(
        &self,
        schema: &MetricSchema,
        ids: &[String],
        window: &CollectionWindow,
    ) -> Result<MonitoringData> {
        let mut data = MonitoringData::new();
        for key in schema.flatten_keys() {
            for ds in &self.data_sources {
                let series = self
                    .client
                    .get_metric_data(&ds.data_source_id, &self.resource_type, ids, &key, window)
                    .await?;
                for (id, samples) in series {
                    if samples.is_empty() {
                        continue;
                    }
                    data.entry(id)
                        .or_default()
                        .entry(key.clone())
                        .or_insert(samples);
                }
            }
        }
        Ok(data)
    }
}

impl BackendRegistry {
    /// One [`DataSourceBackend`] per provider in `priority`, each bound to
    /// that provider's data sources.
    pub fn from_data_sources(
        priority: &[Provider],
        data_sources: &HashMap<Provider, Vec<DataSourceRef>>,
        client: Arc<dyn MonitoringClient>,
        resource_type: &str,
    ) -> Self {
        let mut registry = Self::new();
        for &provider in priority {
            let sources = data_sources.get(&provider).cloned().unwrap_or_default();
            registry.register(Arc::new(DataSourceBackend::new(
                provider,
                sources,
                Arc::clone(&client),
                resource_type,
            )));
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use oxmetric_common::types::MetricSample;
    use std::sync::Mutex;

    /// Two data sources: `ds-a` knows `s1`, `ds-b` knows `s1` and `s2`.
    #[derive(Default)]
    struct FakeMonitoring {
        metric_calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl MonitoringClient for FakeMonitoring {
        async fn list_data_sources(&self) -> Result<Vec<DataSourceInfo>> {
            Ok(vec![])
        }

        async fn list_metrics(
            &self,
            data_source_id: &str,
            _resource_type: &str,
            ids: &[String],
        ) -> Result<AvailabilityResult> {
            let known: &[&str] = match data_source_id {
                "ds-a" => &["s1"],
                _ => &["s2", "s1"],
            };
            Ok(AvailabilityResult {
                available_resources: ids
                    .iter()
                    .filter(|id| known.contains(&id.as_str()))
                    .cloned()
                    .collect(),
            })
        }

        async fn get_metric_data(
            &self,
            data_source_id: &str,
            _resource_type: &str,
            ids: &[String],
            metric_key: &str,
            _window: &CollectionWindow,
        ) -> Result<HashMap<String, MetricSeries>> {
            self.metric_calls
                .lock()
                .unwrap()
                .push((data_source_id.to_string(), metric_key.to_string()));
            let value = if data_source_id == "ds-a" { 1.0 } else { 2.0 };
            Ok(ids
                .iter()
                .map(|id| {
                    let samples = if data_source_id == "ds-a" && id == "s2" {
                        vec![]
                    } else {
                        vec![MetricSample {
                            timestamp: Utc::now(),
                            value,
                        }]
                    };
                    (id.clone(), samples)
                })
                .collect())
        }
    }

    fn window() -> CollectionWindow {
        CollectionWindow::ending_at(Utc::now(), chrono::Duration::hours(1))
    }

    fn refs(ids: &[&str]) -> Vec<DataSourceRef> {
        ids.iter()
            .map(|id| DataSourceRef {
                name: format!("{id}-name"),
                data_source_id: id.to_string(),
            })
            .collect()
    }

    #[test]
    fn should_group_data_sources_per_provider_in_listing_order() {
        let info = |provider, id: &str| DataSourceInfo {
            provider,
            name: format!("{id}-name"),
            data_source_id: id.to_string(),
        };
        let grouped = group_data_sources(vec![
            info(Provider::Aws, "ds-1"),
            info(Provider::Azure, "ds-2"),
            info(Provider::Aws, "ds-3"),
        ]);

        assert_eq!(grouped[&Provider::Aws], refs(&["ds-1", "ds-3"]));
        assert_eq!(grouped[&Provider::Azure], refs(&["ds-2"]));
        assert!(!grouped.contains_key(&Provider::GoogleCloud));
    }

    #[tokio::test]
    async fn should_union_availability_across_data_sources() {
        let backend = DataSourceBackend::new(
            Provider::Aws,
            refs(&["ds-a", "ds-b"]),
            Arc::new(FakeMonitoring::default()),
            "inventory.Server",
        );
        let ids = vec!["s1".to_string(), "s2".to_string(), "s3".to_string()];

        let result = backend
            .check_availability("inventory.Server", &ids)
            .await
            .unwrap();
        assert_eq!(result.available_resources, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn should_report_nothing_available_without_data_sources() {
        let backend = DataSourceBackend::new(
            Provider::Azure,
            vec![],
            Arc::new(FakeMonitoring::default()),
            "inventory.Server",
        );
        let result = backend
            .check_availability("inventory.Server", &["vm-1".to_string()])
            .await
            .unwrap();
        assert!(result.available_resources.is_empty());
    }

    #[tokio::test]
    async fn should_query_each_key_and_keep_first_non_empty_series() {
        let client = Arc::new(FakeMonitoring::default());
        let backend = DataSourceBackend::new(
            Provider::Aws,
            refs(&["ds-a", "ds-b"]),
            client.clone(),
            "inventory.Server",
        );
        let schema = MetricSchema::from_value(serde_json::json!({
            "cpu": {"utilization": {}},
            "memory": {"usage": {}}
        }))
        .unwrap();
        let ids = vec!["s1".to_string(), "s2".to_string()];

        let data = backend.query_metrics(&schema, &ids, &window()).await.unwrap();

        assert_eq!(data["s1"]["cpu.utilization"][0].value, 1.0);
        assert_eq!(data["s2"]["cpu.utilization"][0].value, 2.0);
        assert_eq!(data["s2"]["memory.usage"].len(), 1);
        assert_eq!(client.metric_calls.lock().unwrap().len(), 4);
    }

    #[test]
    fn should_build_registry_in_priority_order() {
        let mut sources = HashMap::new();
        sources.insert(Provider::Aws, refs(&["ds-aws"]));
        let registry = BackendRegistry::from_data_sources(
            &[Provider::Azure, Provider::GoogleCloud, Provider::Aws],
            &sources,
            Arc::new(FakeMonitoring::default()),
            "inventory.Server",
        );

        assert_eq!(
            registry.providers(),
            vec![Provider::Azure, Provider::GoogleCloud, Provider::Aws]
        );
    }
}
