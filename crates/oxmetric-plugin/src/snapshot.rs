//! File-backed collaborators for offline runs.
//!
//! A snapshot is a JSON document holding what identity, inventory and
//! monitoring would have answered, so a full collection cycle can be replayed
//! without reaching any service.

use crate::clients::{
    ClientFactory, CollectorContext, Endpoint, IdentityClient, InventoryClient, SecretData,
};
use anyhow::{Context, Result};
use oxmetric_cloud::monitoring::MonitoringClient;
use oxmetric_common::types::{
    AvailabilityResult, CollectionWindow, DataSourceInfo, MetricSeries, ResourceRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    /// Keys identity accepts. Empty accepts any key.
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub servers: Vec<ResourceRecord>,
    #[serde(default)]
    pub data_sources: Vec<DataSourceInfo>,
    /// `data_source_id → server ids` the data source can serve.
    #[serde(default)]
    pub availability: HashMap<String, Vec<String>>,
    /// `data_source_id → server_id → metric key → samples`.
    #[serde(default)]
    pub metrics: HashMap<String, HashMap<String, HashMap<String, MetricSeries>>>,
}

impl Snapshot {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot file '{path}'"))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot file '{path}'"))
    }
}

/// Every collaborator, answered from one [`Snapshot`].
#[derive(Clone)]
pub struct SnapshotClients {
    snapshot: Arc<Snapshot>,
    api_key: Option<String>,
}

impl SnapshotClients {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            api_key: None,
        }
    }

    fn key_accepted(&self) -> bool {
        match &self.api_key {
            Some(key) => {
                self.snapshot.api_keys.is_empty()
                    || self.snapshot.api_keys.iter().any(|k| k == key)
            }
            None => false,
        }
    }
}

#[async_trait::async_trait]
impl IdentityClient for SnapshotClients {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>> {
        if !self.key_accepted() {
            anyhow::bail!("api key rejected by identity");
        }
        Ok(self.snapshot.endpoints.clone())
    }

    async fn domain_id(&self) -> Result<String> {
        Ok(self.snapshot.domain_id.clone())
    }
}

#[async_trait::async_trait]
impl InventoryClient for SnapshotClients {
    /// An object filter keeps servers whose top-level fields equal every
    /// given value. Any other filter keeps everything.
    async fn list_servers(&self, filter: &Value) -> Result<Vec<ResourceRecord>> {
        let Some(conditions) = filter.as_object().filter(|c| !c.is_empty()) else {
            return Ok(self.snapshot.servers.clone());
        };
        let mut servers = Vec::new();
        for server in &self.snapshot.servers {
            let fields = serde_json::to_value(server)?;
            if conditions.iter().all(|(k, v)| fields.get(k) == Some(v)) {
                servers.push(server.clone());
            }
        }
        Ok(servers)
    }
}

#[async_trait::async_trait]
impl MonitoringClient for SnapshotClients {
    async fn list_data_sources(&self) -> Result<Vec<DataSourceInfo>> {
        Ok(self.snapshot.data_sources.clone())
    }

    async fn list_metrics(
        &self,
        data_source_id: &str,
        _resource_type: &str,
        ids: &[String],
    ) -> Result<AvailabilityResult> {
        let known = self
            .snapshot
            .availability
            .get(data_source_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(AvailabilityResult {
            available_resources: ids.iter().filter(|id| known.contains(*id)).cloned().collect(),
        })
    }

    /// Samples outside `window` are left out.
    async fn get_metric_data(
        &self,
        data_source_id: &str,
        _resource_type: &str,
        ids: &[String],
        metric_key: &str,
        window: &CollectionWindow,
    ) -> Result<HashMap<String, MetricSeries>> {
        let Some(by_server) = self.snapshot.metrics.get(data_source_id) else {
            return Ok(HashMap::new());
        };
        let mut result = HashMap::new();
        for id in ids {
            let Some(series) = by_server.get(id).and_then(|m| m.get(metric_key)) else {
                continue;
            };
            let in_window: MetricSeries = series
                .iter()
                .filter(|s| s.timestamp >= window.start && s.timestamp <= window.end)
                .copied()
                .collect();
            result.insert(id.clone(), in_window);
        }
        Ok(result)
    }
}

impl ClientFactory for SnapshotClients {
    fn identity(&self, secret: &SecretData) -> Result<Arc<dyn IdentityClient>> {
        Ok(Arc::new(Self {
            snapshot: Arc::clone(&self.snapshot),
            api_key: secret.api_key.clone(),
        }))
    }

    fn inventory(&self, _ctx: &CollectorContext) -> Result<Arc<dyn InventoryClient>> {
        Ok(Arc::new(self.clone()))
    }

    fn monitoring(&self, _ctx: &CollectorContext) -> Result<Arc<dyn MonitoringClient>> {
        Ok(Arc::new(self.clone()))
    }
}
