//! Tenant-partitioned cache with lazy expiry and a background sweeper.
//!
//! Every tenant owns a [`DomainCache`] behind its own mutex. The outer
//! `DashMap` is only touched to find or create that mutex, so one tenant's
//! traffic (or sweep) never waits on another tenant's lock.

use crate::domain::{CacheStats, DomainCache, Lookup};
use crate::entry::{CacheEntry, CacheValue};
use crate::key::cache_key;
use crate::sweep::{self, Sweeper};
use dashmap::DashMap;
use domaingate_core::config::CacheConfig;
use domaingate_core::{Clock, GateError, GateResult, SystemClock, TenantConfig, TenantId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

type SharedDomainCache = Arc<Mutex<DomainCache>>;

pub struct CacheManager {
    caches: DashMap<TenantId, SharedDomainCache>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    sweep_interval: Duration,
    shutdown_timeout: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl CacheManager {
    /// Create a cache manager on the system clock.
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache manager reading time from `clock`.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            default_ttl_secs = config.default_ttl_secs,
            sweep_interval_secs = config.sweep_interval_secs,
            "CacheManager initialized"
        );
        Self {
            caches: DashMap::new(),
            clock,
            default_ttl: Duration::from_secs(config.default_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            sweeper: Mutex::new(None),
        }
    }

    fn tenant_cache(&self, tenant: &TenantId) -> SharedDomainCache {
        if let Some(cache) = self.existing(tenant) {
            return cache;
        }
        self.caches
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(Mutex::new(DomainCache::new(tenant.clone()))))
            .value()
            .clone()
    }

    fn existing(&self, tenant: &TenantId) -> Option<SharedDomainCache> {
        self.caches.get(tenant).map(|e| e.value().clone())
    }

    fn snapshot(&self) -> Vec<(TenantId, SharedDomainCache)> {
        self.caches
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Look up a value. Expired entries are evicted on the spot and count as
    /// misses; reads never extend the TTL.
    pub fn get(&self, tenant: &str, key: &str) -> GateResult<Option<CacheValue>> {
        let tenant = TenantId::new(tenant)?;
        let hashed = cache_key(&tenant, key);
        let now = self.clock.now();

        let outcome = self.tenant_cache(&tenant).lock().lookup(&hashed, now);
        match outcome {
            Lookup::Hit(value) => {
                metrics::counter!("cache.hit").increment(1);
                debug!(domain = %tenant, key = key, "Cache hit");
                Ok(Some(value))
            }
            Lookup::Miss => {
                metrics::counter!("cache.miss").increment(1);
                debug!(domain = %tenant, key = key, "Cache miss (not found)");
                Ok(None)
            }
            Lookup::Expired => {
                metrics::counter!("cache.miss").increment(1);
                metrics::counter!("cache.expired").increment(1);
                debug!(domain = %tenant, key = key, "Cache miss (expired)");
                Ok(None)
            }
        }
    }

    /// Store a value, overwriting any existing entry. `None` uses the
    /// configured default TTL.
    pub fn set(
        &self,
        tenant: &str,
        key: &str,
        value: impl Into<CacheValue>,
        ttl: Option<Duration>,
    ) -> GateResult<()> {
        let tenant = TenantId::new(tenant)?;
        let ttl = ttl.unwrap_or(self.default_ttl);
        // TTLs beyond chrono's range clamp to the longest representable one.
        let chrono_ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        let hashed = cache_key(&tenant, key);
        let entry = CacheEntry::new(value.into(), self.clock.now(), chrono_ttl);
        self.tenant_cache(&tenant).lock().insert(hashed, entry);

        metrics::counter!("cache.set").increment(1);
        debug!(domain = %tenant, key = key, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    /// Store with a TTL given in signed seconds, rejecting negative values.
    pub fn set_with_ttl_secs(
        &self,
        tenant: &str,
        key: &str,
        value: impl Into<CacheValue>,
        ttl_secs: i64,
    ) -> GateResult<()> {
        let ttl = u64::try_from(ttl_secs).map_err(|_| GateError::InvalidTtl(ttl_secs))?;
        self.set(tenant, key, value, Some(Duration::from_secs(ttl)))
    }

    /// Store using the tenant's configured cache timeout.
    pub fn set_with_tenant_config(
        &self,
        tenant: &str,
        key: &str,
        value: impl Into<CacheValue>,
        config: &TenantConfig,
    ) -> GateResult<()> {
        self.set(
            tenant,
            key,
            value,
            Some(Duration::from_secs(config.cache_timeout_secs)),
        )
    }

    /// Remove one entry. Returns false if the key was not present.
    pub fn delete(&self, tenant: &str, key: &str) -> GateResult<bool> {
        let tenant = TenantId::new(tenant)?;
        let hashed = cache_key(&tenant, key);
        let removed = self.tenant_cache(&tenant).lock().remove(&hashed);
        if removed {
            metrics::counter!("cache.delete").increment(1);
            debug!(domain = %tenant, key = key, "Cache delete");
        } else {
            debug!(domain = %tenant, key = key, "Cache delete failed (not found)");
        }
        Ok(removed)
    }

    /// Remove every entry of one tenant. Historical counters are kept.
    pub fn clear_tenant(&self, tenant: &str) -> GateResult<usize> {
        let tenant = TenantId::new(tenant)?;
        let count = self.tenant_cache(&tenant).lock().clear();
        metrics::counter!("cache.delete").increment(count as u64);
        info!(domain = %tenant, cleared = count, "Cleared tenant cache");
        Ok(count)
    }

    /// Looking at stats does not register an untouched tenant.
    pub fn stats(&self, tenant: &str) -> GateResult<CacheStats> {
        let tenant = TenantId::new(tenant)?;
        let stats = match self.existing(&tenant) {
            Some(cache) => cache.lock().stats(),
            None => DomainCache::new(tenant).stats(),
        };
        Ok(stats)
    }

    /// Stats for every tenant that has been touched, including tenants whose
    /// entries have all been cleared.
    pub fn all_stats(&self) -> BTreeMap<String, CacheStats> {
        self.snapshot()
            .into_iter()
            .map(|(tenant, cache)| (tenant.to_string(), cache.lock().stats()))
            .collect()
    }

    /// Live entries currently held for one tenant.
    pub fn domain_entry_count(&self, tenant: &str) -> GateResult<usize> {
        let tenant = TenantId::new(tenant)?;
        let count = self.existing(&tenant).map(|c| c.lock().len()).unwrap_or(0);
        Ok(count)
    }

    /// Entries held across every tenant.
    pub fn total_entry_count(&self) -> usize {
        self.snapshot()
            .into_iter()
            .map(|(_, cache)| cache.lock().len())
            .sum()
    }

    /// Hashed keys held for a tenant, for debugging.
    pub fn list_keys(&self, tenant: &str) -> GateResult<Vec<String>> {
        let tenant = TenantId::new(tenant)?;
        let keys = self
            .existing(&tenant)
            .map(|c| c.lock().keys())
            .unwrap_or_default();
        Ok(keys)
    }

    /// Tenants with a cache table, sorted.
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self.caches.iter().map(|e| e.key().to_string()).collect();
        tenants.sort();
        tenants
    }

    /// One sweep pass over every tenant, each under its own lock.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut total = 0;
        for (tenant, cache) in self.snapshot() {
            let purged = cache.lock().purge_expired(now);
            if purged > 0 {
                debug!(domain = %tenant, purged = purged, "Purged expired cache entries");
            }
            total += purged;
        }
        if total > 0 {
            metrics::counter!("cache.sweep.evicted").increment(total as u64);
            debug!(total = total, "Cleaned up expired cache entries");
        }
        total
    }

    /// Spawn the background sweeper on the current tokio runtime. Calling it
    /// again while a sweeper is running does nothing.
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }
        *slot = Some(sweep::spawn(Arc::downgrade(self), self.sweep_interval));
        debug!(interval_secs = self.sweep_interval.as_secs(), "Cache sweeper started");
    }

    /// Whether a background sweeper is currently alive.
    pub fn sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .map(|s| !s.is_finished())
            .unwrap_or(false)
    }

    /// Stop the sweeper, waiting at most the configured shutdown timeout,
    /// then clear every tenant. Returns the number of entries cleared.
    pub async fn shutdown(&self) -> usize {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            if !sweeper.stop(self.shutdown_timeout).await {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Cache sweeper did not stop in time, continuing shutdown"
                );
            }
        }

        let mut total_cleared = 0;
        for (_, cache) in self.snapshot() {
            total_cleared += cache.lock().clear();
        }
        info!(total_cleared = total_cleared, "CacheManager shutdown");
        total_cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domaingate_core::ManualClock;
    use std::thread;

    fn manager() -> (CacheManager, ManualClock) {
        let clock = ManualClock::starting_now();
        let mgr = CacheManager::with_clock(&CacheConfig::default(), Arc::new(clock.clone()));
        (mgr, clock)
    }

    #[test]
    fn test_tenant_isolation_with_identical_keys() {
        let (mgr, _) = manager();
        mgr.set("a.example.com", "report", "v1", None).unwrap();
        mgr.set("b.example.com", "report", "v2", None).unwrap();

        assert_eq!(mgr.get("a.example.com", "report").unwrap(), Some("v1".into()));
        assert_eq!(mgr.get("b.example.com", "report").unwrap(), Some("v2".into()));

        mgr.clear_tenant("a.example.com").unwrap();
        assert_eq!(mgr.get("a.example.com", "report").unwrap(), None);
        assert_eq!(mgr.get("b.example.com", "report").unwrap(), Some("v2".into()));
    }

    #[test]
    fn test_tenant_id_is_case_insensitive() {
        let (mgr, _) = manager();
        mgr.set("Acme.Example.com", "k", "v", None).unwrap();
        assert_eq!(mgr.get("acme.example.com", "k").unwrap(), Some("v".into()));
    }

    #[test]
    fn test_empty_tenant_is_rejected() {
        let (mgr, _) = manager();
        assert!(matches!(mgr.get("", "k"), Err(GateError::InvalidTenant)));
        assert!(matches!(mgr.set(" ", "k", "v", None), Err(GateError::InvalidTenant)));
        assert!(matches!(mgr.delete("", "k"), Err(GateError::InvalidTenant)));
        assert!(matches!(mgr.clear_tenant(""), Err(GateError::InvalidTenant)));
        assert!(matches!(mgr.stats(""), Err(GateError::InvalidTenant)));
        assert!(mgr.tenants().is_empty());
    }

    #[test]
    fn test_expiry_is_lazy_and_removes_entry() {
        let (mgr, clock) = manager();
        mgr.set("t.com", "k", "v", Some(Duration::from_secs(1))).unwrap();
        assert_eq!(mgr.get("t.com", "k").unwrap(), Some("v".into()));
        assert_eq!(mgr.stats("t.com").unwrap().total_entries, 1);

        clock.advance(chrono::Duration::milliseconds(1100));
        assert_eq!(mgr.get("t.com", "k").unwrap(), None);
        let stats = mgr.stats("t.com").unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_expired, 1);
    }

    #[test]
    fn test_reads_do_not_extend_ttl() {
        let (mgr, clock) = manager();
        mgr.set("t.com", "k", "v", Some(Duration::from_secs(10))).unwrap();
        for _ in 0..3 {
            clock.advance_secs(3);
            assert!(mgr.get("t.com", "k").unwrap().is_some());
        }
        clock.advance_secs(1);
        assert!(mgr.get("t.com", "k").unwrap().is_none());
    }

    #[test]
    fn test_zero_ttl_and_negative_ttl() {
        let (mgr, _) = manager();
        mgr.set("t.com", "zero", "v", Some(Duration::ZERO)).unwrap();
        assert_eq!(mgr.get("t.com", "zero").unwrap(), None);

        assert!(matches!(
            mgr.set_with_ttl_secs("t.com", "neg", "v", -1),
            Err(GateError::InvalidTtl(-1))
        ));
        assert_eq!(mgr.stats("t.com").unwrap().total_sets, 1);
    }

    #[test]
    fn test_default_ttl_is_used_when_omitted() {
        let (mgr, clock) = manager();
        mgr.set("t.com", "k", "v", None).unwrap();
        clock.advance_secs(299);
        assert!(mgr.get("t.com", "k").unwrap().is_some());
        clock.advance_secs(2);
        assert!(mgr.get("t.com", "k").unwrap().is_none());
    }

    #[test]
    fn test_set_overwrites_and_resets_timestamps() {
        let (mgr, clock) = manager();
        mgr.set("t.com", "k", "old", Some(Duration::from_secs(5))).unwrap();
        clock.advance_secs(4);
        mgr.set("t.com", "k", "new", Some(Duration::from_secs(5))).unwrap();
        clock.advance_secs(4);
        assert_eq!(mgr.get("t.com", "k").unwrap(), Some("new".into()));
        let stats = mgr.stats("t.com").unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_sets, 2);
    }

    #[test]
    fn test_hit_rate_matches_counts() {
        let (mgr, _) = manager();
        mgr.set("t.com", "k", "v", None).unwrap();
        let (hits, misses) = (7u64, 3u64);
        for i in 0..(hits + misses) {
            if i % 3 == 0 && i / 3 < misses {
                mgr.get("t.com", "nope").unwrap();
            } else {
                mgr.get("t.com", "k").unwrap();
            }
        }
        let stats = mgr.stats("t.com").unwrap();
        assert_eq!(stats.total_hits, hits);
        assert_eq!(stats.total_misses, misses);
        assert!((stats.hit_rate() - 70.0).abs() < 1e-9);
        assert_eq!(stats.hit_rate_percent, 70.0);
    }

    #[test]
    fn test_delete_counts_only_existing() {
        let (mgr, _) = manager();
        mgr.set("t.com", "k", "v", None).unwrap();
        assert!(mgr.delete("t.com", "k").unwrap());
        assert!(!mgr.delete("t.com", "k").unwrap());
        assert_eq!(mgr.stats("t.com").unwrap().total_deletes, 1);
    }

    #[test]
    fn test_all_stats_includes_cleared_tenants() {
        let (mgr, _) = manager();
        mgr.set("a.com", "k1", "v", None).unwrap();
        mgr.set("a.com", "k2", "v", None).unwrap();
        mgr.set("b.com", "k", "v", None).unwrap();
        assert_eq!(mgr.clear_tenant("a.com").unwrap(), 2);

        let all = mgr.all_stats();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a.com"].total_entries, 0);
        assert_eq!(all["a.com"].total_sets, 2);
        assert_eq!(all["a.com"].total_deletes, 2);
        assert_eq!(all["b.com"].total_entries, 1);
        assert_eq!(mgr.total_entry_count(), 1);
    }

    #[test]
    fn test_tenant_config_timeout_scenario() {
        let (mgr, clock) = manager();
        let mut acme = TenantConfig::new("acme.example.com", "Acme", 120);
        acme.data_source_id = "sheet-acme".into();
        let blob = CacheValue::from(vec![1u8, 2, 3]);

        mgr.set_with_tenant_config("acme.example.com", "report", blob.clone(), &acme)
            .unwrap();
        assert_eq!(mgr.get("acme.example.com", "report").unwrap(), Some(blob));

        clock.advance_secs(121);
        assert_eq!(mgr.get("acme.example.com", "report").unwrap(), None);
        let stats = mgr.stats("acme.example.com").unwrap();
        assert_eq!(stats.total_entries, 0);
        assert!(stats.total_sets >= 1);
    }

    #[test]
    fn test_huge_tenant_timeout_is_clamped() {
        let (mgr, clock) = manager();
        let forever = TenantConfig::new("forever.example.com", "Forever", u64::MAX);

        mgr.set_with_tenant_config("forever.example.com", "k", "v", &forever)
            .unwrap();
        clock.advance_secs(10 * 365 * 24 * 3600);
        assert_eq!(
            mgr.get("forever.example.com", "k").unwrap(),
            Some(CacheValue::from("v"))
        );
    }

    #[test]
    fn test_purge_expired_across_tenants() {
        let (mgr, clock) = manager();
        mgr.set("a.com", "short", "v", Some(Duration::from_secs(1))).unwrap();
        mgr.set("b.com", "short", "v", Some(Duration::from_secs(1))).unwrap();
        mgr.set("b.com", "long", "v", Some(Duration::from_secs(600))).unwrap();

        clock.advance_secs(2);
        assert_eq!(mgr.purge_expired(), 2);
        assert_eq!(mgr.domain_entry_count("a.com").unwrap(), 0);
        assert_eq!(mgr.domain_entry_count("b.com").unwrap(), 1);
        assert_eq!(mgr.list_keys("b.com").unwrap().len(), 1);
    }

    #[test]
    fn test_concurrent_writers_on_many_tenants() {
        let (mgr, _) = manager();
        let mgr = Arc::new(mgr);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let mgr = mgr.clone();
                thread::spawn(move || {
                    let tenant = format!("t{t}.example.com");
                    for i in 0..100 {
                        mgr.set(&tenant, &format!("k{i}"), i as i64, None).unwrap();
                        mgr.get(&tenant, &format!("k{i}")).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(mgr.total_entry_count(), 800);
        for (_, stats) in mgr.all_stats() {
            assert_eq!(stats.total_sets, 100);
            assert_eq!(stats.total_hits, 100);
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_sweeper_and_clears() {
        let (mgr, _) = manager();
        let mgr = Arc::new(mgr);
        mgr.start_sweeper();
        assert!(mgr.sweeper_running());
        mgr.set("a.com", "k", "v", None).unwrap();
        mgr.set("b.com", "k", "v", None).unwrap();

        assert_eq!(mgr.shutdown().await, 2);
        assert!(!mgr.sweeper_running());
        assert_eq!(mgr.total_entry_count(), 0);
        assert_eq!(mgr.stats("a.com").unwrap().total_sets, 1);
    }
}
