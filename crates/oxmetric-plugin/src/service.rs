use crate::clients::{ClientFactory, CollectorContext, SecretData};
use crate::config::PluginConfig;
use crate::error::PluginError;
use anyhow::Result;
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use oxmetric_cloud::collector::CollectionDriver;
use oxmetric_cloud::monitoring::group_data_sources;
use oxmetric_cloud::{BackendRegistry, RegionFilter};
use oxmetric_common::schema::{MetricInfo, MetricSchema};
use oxmetric_common::types::{Provider, SUPPORTED_RESOURCE_TYPES};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Capability advertised to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub filter_format: Vec<Value>,
    pub supported_resource_type: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitResponse {
    pub metadata: PluginMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResourcesParams {
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub secret_data: SecretData,
    #[serde(default)]
    pub filter: Value,
}

/// Entry point the host calls once per collection cycle.
pub struct CollectorService {
    factory: Arc<dyn ClientFactory>,
    schema: MetricSchema,
    providers: Vec<Provider>,
    region_filter: RegionFilter,
    config: PluginConfig,
}

impl CollectorService {
    /// # Errors
    ///
    /// Returns [`PluginError::Collector`] when `config` names an unsupported
    /// provider or resource type.
    pub fn new(factory: Arc<dyn ClientFactory>, config: PluginConfig) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self {
            factory,
            schema: MetricSchema::server_default(),
            providers: config.provider_priority()?,
            region_filter: config.region_filter()?,
            config,
        })
    }

    pub fn with_schema(mut self, schema: MetricSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn init(&self, _options: &Value) -> InitResponse {
        InitResponse {
            metadata: PluginMetadata {
                filter_format: Vec::new(),
                supported_resource_type: SUPPORTED_RESOURCE_TYPES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
        }
    }

    pub fn verify(&self, _options: &Value, secret_data: &SecretData) -> crate::error::Result<()> {
        required_api_key(secret_data).map(|_| ())
    }

    pub fn metric_info(&self) -> MetricInfo {
        MetricInfo::from(self.schema.clone())
    }

    /// Resolves collaborators, lists servers and returns their monitoring
    /// records as JSON, one item per server.
    ///
    /// Credential problems are reported as [`PluginError`] before any
    /// provider is queried. Provider work happens while the stream is
    /// polled.
    pub async fn list_resources(
        &self,
        params: ListResourcesParams,
    ) -> Result<impl Stream<Item = Result<Value>> + Send + 'static> {
        let started = Instant::now();
        tracing::info!("Monitoring metric collection started");

        let metric_info = self.metric_info();
        let api_key = required_api_key(&params.secret_data)?;

        let (endpoints, domain_id) = self
            .resolve_endpoints(&params.secret_data)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to resolve endpoints");
                PluginError::InvalidApiKey {
                    reason: e.to_string(),
                }
            })?;
        tracing::debug!(domain_id = %domain_id, endpoints = endpoints.len(), "Resolved endpoints");

        let ctx = CollectorContext {
            endpoints,
            domain_id,
            api_key: api_key.replace(' ', ""),
        };
        let inventory = self.factory.inventory(&ctx)?;
        let monitoring = self.factory.monitoring(&ctx)?;

        let data_sources = group_data_sources(monitoring.list_data_sources().await?);
        let servers = inventory.list_servers(&params.filter).await?;
        tracing::info!(servers = servers.len(), "Listed servers");

        let registry = BackendRegistry::from_data_sources(
            &self.providers,
            &data_sources,
            monitoring,
            &self.config.resource_type,
        );
        let window = self.config.window(Utc::now());
        let records = CollectionDriver::new(registry, self.region_filter.clone())
            .with_resource_type(&self.config.resource_type)
            .collect(servers, metric_info.json, window)
            .map(|record| -> Result<Value> { Ok(record?.to_primitive()?) });

        let aborted = Arc::new(AtomicBool::new(false));
        let records = records.inspect({
            let aborted = aborted.clone();
            move |record| {
                if record.is_err() {
                    aborted.store(true, Ordering::Relaxed);
                }
            }
        });
        let finished = stream::once(async move {
            let elapsed_secs = started.elapsed().as_secs_f64();
            if aborted.load(Ordering::Relaxed) {
                tracing::error!(
                    elapsed_secs,
                    outcome = "aborted",
                    "Monitoring metric collection aborted"
                );
            } else {
                tracing::info!(
                    elapsed_secs,
                    outcome = "completed",
                    "Monitoring metric collection finished"
                );
            }
            None::<Result<Value>>
        })
        .filter_map(futures::future::ready);

        Ok(records.chain(finished))
    }

    async fn resolve_endpoints(
        &self,
        secret_data: &SecretData,
    ) -> Result<(Vec<crate::clients::Endpoint>, String)> {
        let identity = self.factory.identity(secret_data)?;
        let endpoints = identity.list_endpoints().await?;
        let domain_id = identity.domain_id().await?;
        Ok((endpoints, domain_id))
    }
}

fn required_api_key(secret_data: &SecretData) -> crate::error::Result<&str> {
    secret_data
        .api_key
        .as_deref()
        .ok_or(PluginError::ApiKeyNotFound)
}
