use chrono::{DateTime, Duration, Utc};
use oxmetric_cloud::error::{CollectorError, Result};
use oxmetric_cloud::{parse_providers, RegionFilter};
use oxmetric_common::types::{CollectionWindow, Provider, SUPPORTED_RESOURCE_TYPES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Length of the observation window ending at run start.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Configured providers, highest priority first.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    /// Overrides of the built-in region qualification, e.g. `aws = false`.
    #[serde(default)]
    pub region_filter: BTreeMap<String, bool>,
    #[serde(default = "default_resource_type")]
    pub resource_type: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            providers: default_providers(),
            region_filter: BTreeMap::new(),
            resource_type: default_resource_type(),
        }
    }
}

fn default_window_secs() -> u64 {
    86400
}

fn default_providers() -> Vec<String> {
    vec![
        "azure".to_string(),
        "google_cloud".to_string(),
        "aws".to_string(),
    ]
}

fn default_resource_type() -> String {
    "inventory.Server".to_string()
}

impl PluginConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn provider_priority(&self) -> Result<Vec<Provider>> {
        parse_providers(&self.providers)
    }

    pub fn region_filter(&self) -> Result<RegionFilter> {
        let mut filter = RegionFilter::default();
        for (name, &enabled) in &self.region_filter {
            let provider: Provider = name
                .parse()
                .map_err(|_| CollectorError::UnsupportedProvider(name.clone()))?;
            filter = filter.with_override(provider, enabled);
        }
        Ok(filter)
    }

    /// The window every provider reports over, fixed at `end`.
    pub fn window(&self, end: DateTime<Utc>) -> CollectionWindow {
        CollectionWindow::ending_at(end, Duration::seconds(self.window_secs as i64))
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 || self.window_secs > i64::MAX as u64 {
            return Err(CollectorError::ConfigError(format!(
                "window_secs out of range: {}",
                self.window_secs
            )));
        }
        if !SUPPORTED_RESOURCE_TYPES.contains(&self.resource_type.as_str()) {
            return Err(CollectorError::ConfigError(format!(
                "unsupported resource_type: {}",
                self.resource_type
            )));
        }
        self.provider_priority()?;
        self.region_filter()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn should_fill_defaults_from_empty_toml() {
        let config: PluginConfig = toml::from_str("").unwrap();
        assert_eq!(config.window_secs, 86400);
        assert_eq!(
            config.provider_priority().unwrap(),
            vec![Provider::Azure, Provider::GoogleCloud, Provider::Aws]
        );
        assert!(config.region_filter().unwrap().applies(Provider::Aws));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_apply_region_filter_overrides() {
        let config: PluginConfig = toml::from_str(
            r#"
            providers = ["aws"]

            [region_filter]
            aws = false
            azure = true
            "#,
        )
        .unwrap();
        let filter = config.region_filter().unwrap();
        assert!(!filter.applies(Provider::Aws));
        assert!(filter.applies(Provider::Azure));
        assert_eq!(config.provider_priority().unwrap(), vec![Provider::Aws]);
    }

    #[test]
    fn should_reject_unknown_providers_and_empty_window() {
        let config = PluginConfig {
            providers: vec!["openstack".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CollectorError::UnsupportedProvider(_))
        ));

        let config = PluginConfig {
            window_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CollectorError::ConfigError(_))));
    }

    #[test]
    fn should_end_window_at_given_instant() {
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let config = PluginConfig {
            window_secs: 3600,
            ..Default::default()
        };
        let window = config.window(end);
        assert_eq!(window.end, end);
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap());
    }
}
