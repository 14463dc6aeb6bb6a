use crate::RegionFilter;
use oxmetric_common::types::{Provider, ResourceRecord};
use std::collections::HashMap;

/// Placeholder used when a record lacks an account or region.
const MISSING: &str = "None";

/// Billing identity a server is grouped under.
///
/// Either the account alone or `account_region` when the provider qualifies
/// accounts by region. Missing parts render as `None`, which still forms a
/// valid bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountKey(String);

impl AccountKey {
    pub fn derive(account: Option<&str>, region_code: Option<&str>, region_filter: bool) -> Self {
        let account = account.unwrap_or(MISSING);
        if region_filter {
            Self(format!("{account}_{}", region_code.unwrap_or(MISSING)))
        } else {
            Self(account.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct AccountBucket {
    pub key: AccountKey,
    pub records: Vec<ResourceRecord>,
}

impl AccountBucket {
    pub fn server_ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.server_id.as_str()).collect()
    }
}

/// Servers of one provider, bucketed by account key in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ProviderGroup {
    buckets: Vec<AccountBucket>,
    index: HashMap<AccountKey, usize>,
}

impl ProviderGroup {
    fn insert_or_append(&mut self, key: AccountKey, record: ResourceRecord) {
        match self.index.get(&key) {
            Some(&pos) => self.buckets[pos].records.push(record),
            None => {
                self.index.insert(key.clone(), self.buckets.len());
                self.buckets.push(AccountBucket {
                    key,
                    records: vec![record],
                });
            }
        }
    }

    pub fn buckets(&self) -> &[AccountBucket] {
        &self.buckets
    }

    pub fn bucket(&self, key: &AccountKey) -> Option<&AccountBucket> {
        self.index.get(key).map(|&pos| &self.buckets[pos])
    }

    /// Account keys in first-seen order.
    pub fn accounts(&self) -> Vec<&AccountKey> {
        self.buckets.iter().map(|b| &b.key).collect()
    }

    /// Every record of the provider, bucket by bucket.
    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.buckets.iter().flat_map(|b| b.records.iter())
    }

    /// Every server id of the provider, bucket by bucket.
    pub fn server_ids(&self) -> Vec<String> {
        self.records().map(|r| r.server_id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// `provider → account key → servers`, built once per run and read-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct ResourceGroups {
    groups: Vec<(Provider, ProviderGroup)>,
}

impl ResourceGroups {
    /// Groups `resources` in a single pass. Providers, account keys and
    /// records keep the order they first appear in.
    pub fn build(resources: Vec<ResourceRecord>, region_filter: &RegionFilter) -> Self {
        let mut groups: Vec<(Provider, ProviderGroup)> = Vec::new();
        for record in resources {
            let provider = record.provider;
            let key = AccountKey::derive(
                record.account(),
                record.region_code.as_deref(),
                region_filter.applies(provider),
            );
            let pos = match groups.iter().position(|(p, _)| *p == provider) {
                Some(pos) => pos,
                None => {
                    groups.push((provider, ProviderGroup::default()));
                    groups.len() - 1
                }
            };
            groups[pos].1.insert_or_append(key, record);
        }

        for (provider, group) in &groups {
            tracing::debug!(
                provider = %provider,
                accounts = group.buckets.len(),
                servers = group.len(),
                "Grouped servers"
            );
        }
        Self { groups }
    }

    /// Providers in first-seen order.
    pub fn providers(&self) -> Vec<Provider> {
        self.groups.iter().map(|(p, _)| *p).collect()
    }

    pub fn get(&self, provider: Provider) -> Option<&ProviderGroup> {
        self.groups
            .iter()
            .find(|(p, _)| *p == provider)
            .map(|(_, g)| g)
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.get(provider).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Provider, &ProviderGroup)> {
        self.groups.iter().map(|(p, g)| (*p, g))
    }

    pub fn total_servers(&self) -> usize {
        self.groups.iter().map(|(_, g)| g.len()).sum()
    }
}
