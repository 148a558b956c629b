//! Per-tenant cache table and its statistics.

use crate::entry::{CacheEntry, CacheValue};
use chrono::{DateTime, Utc};
use domaingate_core::TenantId;
use serde::Serialize;
use std::collections::HashMap;

/// Historical counters. They survive clears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries dropped because they expired, lazily or by the sweeper.
    pub expired: u64,
}

/// Point-in-time statistics for one tenant, recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub domain: String,
    pub total_entries: usize,
    pub total_hits: u64,
    pub total_misses: u64,
    pub total_sets: u64,
    pub total_deletes: u64,
    pub total_expired: u64,
    pub hit_rate_percent: f64,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

impl CacheStats {
    /// Unrounded hit rate in percent; 0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.total_hits, self.total_misses)
    }
}

fn hit_rate(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64 * 100.0
}

/// Outcome of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Hit(CacheValue),
    Miss,
    /// Present but expired; the entry has been removed.
    Expired,
}

/// Entries of one tenant keyed by hashed cache key.
#[derive(Debug)]
pub struct DomainCache {
    tenant: TenantId,
    entries: HashMap<String, CacheEntry>,
    counters: CacheCounters,
}

impl DomainCache {
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            entries: HashMap::new(),
            counters: CacheCounters::default(),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn lookup(&mut self, hashed_key: &str, now: DateTime<Utc>) -> Lookup {
        match self.entries.get_mut(hashed_key) {
            None => {
                self.counters.misses += 1;
                return Lookup::Miss;
            }
            Some(entry) if !entry.is_expired_at(now) => {
                self.counters.hits += 1;
                return Lookup::Hit(entry.access(now));
            }
            Some(_) => {}
        }

        self.entries.remove(hashed_key);
        self.counters.expired += 1;
        self.counters.misses += 1;
        Lookup::Expired
    }

    /// Insert or overwrite unconditionally.
    pub fn insert(&mut self, hashed_key: String, entry: CacheEntry) {
        self.entries.insert(hashed_key, entry);
        self.counters.sets += 1;
    }

    pub fn remove(&mut self, hashed_key: &str) -> bool {
        let removed = self.entries.remove(hashed_key).is_some();
        if removed {
            self.counters.deletes += 1;
        }
        removed
    }

    /// Drop every entry; each one counts as a delete.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.counters.deletes += count as u64;
        count
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let purged = before - self.entries.len();
        self.counters.expired += purged as u64;
        purged
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    pub fn stats(&self) -> CacheStats {
        let c = self.counters;
        let oldest_entry = self.entries.values().map(|e| e.created_at).min();
        let newest_entry = self.entries.values().map(|e| e.created_at).max();
        let total_size_bytes = self
            .entries
            .values()
            .map(|e| e.value.estimated_size())
            .sum();

        CacheStats {
            domain: self.tenant.to_string(),
            total_entries: self.entries.len(),
            total_hits: c.hits,
            total_misses: c.misses,
            total_sets: c.sets,
            total_deletes: c.deletes,
            total_expired: c.expired,
            hit_rate_percent: (hit_rate(c.hits, c.misses) * 100.0).round() / 100.0,
            total_size_bytes,
            oldest_entry,
            newest_entry,
        }
    }
}
