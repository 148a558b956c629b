//! Runtime registry of tenant configurations.

use domaingate_core::{AppConfig, GateError, GateResult, TenantConfig, TenantConfigProvider, TenantId};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`TenantRegistry::replace_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryChange {
    pub tenants: usize,
    /// Sorted domains that were not registered before.
    pub added: Vec<String>,
    /// Sorted domains that are no longer registered.
    pub removed: Vec<String>,
}

/// Tenant configurations keyed by domain plus an optional default.
///
/// Disabled tenants stay registered (admin tooling can still see them) but
/// are invisible to [`TenantConfigProvider::lookup`].
pub struct TenantRegistry {
    tenants: RwLock<HashMap<TenantId, Arc<TenantConfig>>>,
    default_tenant: RwLock<Option<Arc<TenantConfig>>>,
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantRegistry {
    /// Create an empty registry with no default tenant.
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            default_tenant: RwLock::new(None),
        }
    }

    /// Build a registry from the `tenants` and `default_tenant` sections.
    pub fn from_config(config: &AppConfig) -> Self {
        let registry = Self::new();
        registry.replace_all(config.tenants.values().cloned(), config.default_tenant.clone());
        registry
    }

    /// Insert or replace a tenant. The domain must be well formed.
    pub fn upsert(&self, config: TenantConfig) -> GateResult<()> {
        let id = TenantId::parse_domain(&config.domain)?;
        let mut config = config;
        config.domain = id.to_string();
        let replaced = self.tenants.write().insert(id.clone(), Arc::new(config)).is_some();
        info!(domain = %id, replaced = replaced, "Tenant configuration registered");
        Ok(())
    }

    /// Unregister a tenant. Returns false if it was not registered.
    pub fn remove(&self, domain: &str) -> GateResult<bool> {
        let id = TenantId::new(domain)?;
        let removed = self.tenants.write().remove(&id).is_some();
        if removed {
            info!(domain = %id, "Tenant configuration removed");
        }
        Ok(removed)
    }

    /// Registered configuration regardless of the `enabled` flag.
    pub fn get(&self, domain: &str) -> Option<Arc<TenantConfig>> {
        let id = TenantId::new(domain).ok()?;
        self.tenants.read().get(&id).cloned()
    }

    /// Set or clear the fallback configuration.
    pub fn set_default(&self, config: Option<TenantConfig>) {
        *self.default_tenant.write() = config.map(Arc::new);
    }

    /// Sorted domains of enabled tenants.
    pub fn enabled_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .tenants
            .read()
            .values()
            .filter(|c| c.enabled)
            .map(|c| c.domain.clone())
            .collect();
        domains.sort();
        domains
    }

    /// Every registered tenant, sorted by domain.
    pub fn all(&self) -> Vec<Arc<TenantConfig>> {
        let mut all: Vec<Arc<TenantConfig>> = self.tenants.read().values().cloned().collect();
        all.sort_by(|a, b| a.domain.cmp(&b.domain));
        all
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    /// Problems per domain; only tenants with at least one problem appear.
    pub fn validate(&self) -> BTreeMap<String, Vec<String>> {
        let mut report = BTreeMap::new();
        for config in self.tenants.read().values() {
            let errors = config.validate();
            if !errors.is_empty() {
                report.insert(config.domain.clone(), errors);
            }
        }
        if let Some(default) = self.default_tenant.read().as_ref() {
            let errors = default.validate();
            if !errors.is_empty() {
                report.insert(default.domain.clone(), errors);
            }
        }
        report
    }

    /// Swap in a new set of tenants (configuration reload). Malformed
    /// domains are skipped.
    pub fn replace_all<I>(&self, tenants: I, default_tenant: Option<TenantConfig>) -> RegistryChange
    where
        I: IntoIterator<Item = TenantConfig>,
    {
        let mut next = HashMap::new();
        for mut config in tenants {
            match TenantId::parse_domain(&config.domain) {
                Ok(id) => {
                    config.domain = id.to_string();
                    next.insert(id, Arc::new(config));
                }
                Err(e) => warn!(domain = %config.domain, error = %e, "Skipping tenant configuration"),
            }
        }

        let mut added: Vec<String> = Vec::new();
        let mut removed: Vec<String> = Vec::new();
        let tenants = next.len();
        {
            let mut current = self.tenants.write();
            added.extend(next.keys().filter(|k| !current.contains_key(*k)).map(|k| k.to_string()));
            removed.extend(current.keys().filter(|k| !next.contains_key(*k)).map(|k| k.to_string()));
            *current = next;
        }
        added.sort();
        removed.sort();
        self.set_default(default_tenant);

        info!(
            tenants = tenants,
            added = added.len(),
            removed = removed.len(),
            "Tenant configurations loaded"
        );
        RegistryChange {
            tenants,
            added,
            removed,
        }
    }

    /// Look up by raw domain, failing with [`GateError::UnknownTenant`] if
    /// neither the tenant nor a default exists.
    pub fn resolve(&self, tenant: &TenantId) -> GateResult<Arc<TenantConfig>> {
        self.lookup(tenant)
            .or_else(|| self.default_config())
            .ok_or_else(|| GateError::UnknownTenant(tenant.to_string()))
    }
}

impl TenantConfigProvider for TenantRegistry {
    fn lookup(&self, tenant: &TenantId) -> Option<Arc<TenantConfig>> {
        self.tenants
            .read()
            .get(tenant)
            .filter(|c| c.enabled)
            .cloned()
    }

    fn default_config(&self) -> Option<Arc<TenantConfig>> {
        self.default_tenant.read().clone()
    }
}
