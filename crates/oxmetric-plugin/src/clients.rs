//! Collaborators the collector depends on but does not own.

use anyhow::Result;
use oxmetric_cloud::monitoring::MonitoringClient;
use oxmetric_common::types::ResourceRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub service: String,
    pub endpoint: String,
}

/// Secret handed over by the host for this run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretData {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resolved identity shared by the inventory and monitoring collaborators.
#[derive(Debug, Clone)]
pub struct CollectorContext {
    pub endpoints: Vec<Endpoint>,
    pub domain_id: String,
    pub api_key: String,
}

#[async_trait::async_trait]
pub trait IdentityClient: Send + Sync {
    async fn list_endpoints(&self) -> Result<Vec<Endpoint>>;

    async fn domain_id(&self) -> Result<String>;
}

#[async_trait::async_trait]
pub trait InventoryClient: Send + Sync {
    /// Lists servers matching `filter`, in inventory order.
    async fn list_servers(&self, filter: &Value) -> Result<Vec<ResourceRecord>>;
}

/// Builds the collaborators for one run.
pub trait ClientFactory: Send + Sync {
    fn identity(&self, secret: &SecretData) -> Result<Arc<dyn IdentityClient>>;

    fn inventory(&self, ctx: &CollectorContext) -> Result<Arc<dyn InventoryClient>>;

    fn monitoring(&self, ctx: &CollectorContext) -> Result<Arc<dyn MonitoringClient>>;
}
