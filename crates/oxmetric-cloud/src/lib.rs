//! Multi-provider monitoring collection pipeline.
//!
//! A run groups inventory servers by provider and account
//! ([`grouping`]), then for each configured provider in priority order asks
//! its [`MetricBackend`] which servers are queryable ([`availability`]),
//! fetches their metrics ([`fetch`]) and folds the values back onto the
//! server records ([`merge`]). [`collector::CollectionDriver`] ties the
//! stages together and emits records lazily.

pub mod availability;
pub mod collector;
pub mod error;
pub mod fetch;
pub mod grouping;
pub mod merge;
pub mod monitoring;


use anyhow::Result;
use oxmetric_common::schema::MetricSchema;
use oxmetric_common::types::{AvailabilityResult, CollectionWindow, MonitoringData, Provider};
use std::collections::HashMap;
use std::sync::Arc;

/// Metric backend for one cloud provider.
#[async_trait::async_trait]
pub trait MetricBackend: Send + Sync {
    /// Provider this backend answers for.
    fn provider(&self) -> Provider;

    /// Reports which of `ids` currently support metric queries.
    async fn check_availability(&self, resource_type: &str, ids: &[String])
        -> Result<AvailabilityResult>;

    /// Fetches every schema metric for `ids` over `window`, keyed by id.
    async fn query_metrics(
        &self,
        schema: &MetricSchema,
        ids: &[String],
        window: &CollectionWindow,
    ) -> Result<MonitoringData>;
}

/// Decides, per provider, whether account keys are qualified by region.
///
/// Starts from [`Provider::region_filter`] and accepts per-provider
/// overrides.
///
/// # Examples
///
/// ```
/// use oxmetric_cloud::RegionFilter;
/// use oxmetric_common::types::Provider;
///
/// let filter = RegionFilter::default();
/// assert!(filter.applies(Provider::Aws));
///
/// let filter = filter.with_override(Provider::Aws, false);
/// assert!(!filter.applies(Provider::Aws));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RegionFilter {
    overrides: HashMap<Provider, bool>,
}

impl RegionFilter {
    pub fn with_override(mut self, provider: Provider, enabled: bool) -> Self {
        self.overrides.insert(provider, enabled);
        self
    }

    pub fn applies(&self, provider: Provider) -> bool {
        self.overrides
            .get(&provider)
            .copied()
            .unwrap_or_else(|| provider.region_filter())
    }
}

/// Configured providers and their backends, in priority order.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn MetricBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Appends `backend` at the lowest priority. Registering a provider a
    /// second time replaces its backend and keeps its position.
    pub fn register(&mut self, backend: Arc<dyn MetricBackend>) {
        let provider = backend.provider();
        match self.backends.iter_mut().find(|b| b.provider() == provider) {
            Some(existing) => *existing = backend,
            None => self.backends.push(backend),
        }
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn MetricBackend>> {
        self.backends.iter().find(|b| b.provider() == provider)
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.backends.iter().map(|b| b.provider()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MetricBackend>> {
        self.backends.iter()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses configured provider names, keeping their order.
///
/// # Errors
///
/// Returns [`error::CollectorError::UnsupportedProvider`] for a name outside
/// the supported set, and [`error::CollectorError::ConfigError`] when a
/// provider is listed twice.
pub fn parse_providers<I>(names: I) -> error::Result<Vec<Provider>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut providers = Vec::new();
    for name in names {
        let name = name.as_ref();
        let provider: Provider = name
            .parse()
            .map_err(|_| error::CollectorError::UnsupportedProvider(name.to_string()))?;
        if providers.contains(&provider) {
            return Err(error::CollectorError::ConfigError(format!(
                "provider {provider} listed more than once"
            )));
        }
        providers.push(provider);
    }
    Ok(providers)
}

#[cfg(test)]
mod registry_tests {
    use super::*;

    struct NamedBackend(Provider, &'static str);

    #[async_trait::async_trait]
    impl MetricBackend for NamedBackend {
        fn provider(&self) -> Provider {
            self.0
        }

        async fn check_availability(&self, _: &str, _: &[String]) -> Result<AvailabilityResult> {
            Ok(AvailabilityResult {
                available_resources: vec![self.1.to_string()],
            })
        }

        async fn query_metrics(
            &self,
            _: &MetricSchema,
            _: &[String],
            _: &CollectionWindow,
        ) -> Result<MonitoringData> {
            Ok(MonitoringData::new())
        }
    }

    #[test]
    fn should_keep_registration_order_as_priority() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(NamedBackend(Provider::Azure, "a")));
        registry.register(Arc::new(NamedBackend(Provider::GoogleCloud, "g")));
        registry.register(Arc::new(NamedBackend(Provider::Aws, "w")));

        assert_eq!(
            registry.providers(),
            vec![Provider::Azure, Provider::GoogleCloud, Provider::Aws]
        );
        assert!(registry.get(Provider::Unknown).is_none());
    }

    #[tokio::test]
    async fn should_replace_backend_in_place_when_registered_twice() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(NamedBackend(Provider::Azure, "first")));
        registry.register(Arc::new(NamedBackend(Provider::Aws, "w")));
        registry.register(Arc::new(NamedBackend(Provider::Azure, "second")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.providers()[0], Provider::Azure);
        let result = registry
            .get(Provider::Azure)
            .unwrap()
            .check_availability("inventory.Server", &[])
            .await
            .unwrap();
        assert_eq!(result.available_resources, vec!["second"]);
    }

    #[test]
    fn should_parse_provider_names_in_order() {
        let providers = parse_providers(["azure", "google_cloud", "aws"]).unwrap();
        assert_eq!(
            providers,
            vec![Provider::Azure, Provider::GoogleCloud, Provider::Aws]
        );
    }

    #[test]
    fn should_reject_unknown_and_duplicate_provider_names() {
        assert!(matches!(
            parse_providers(["azure", "openstack"]),
            Err(error::CollectorError::UnsupportedProvider(name)) if name == "openstack"
        ));
        assert!(matches!(
            parse_providers(["aws", "aws"]),
            Err(error::CollectorError::ConfigError(_))
        ));
    }
}
