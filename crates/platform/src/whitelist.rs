//! Allow-list of tenant domains.
//!
//! Entries are exact domain names or `*.suffix` wildcards. A wildcard
//! matches any subdomain of the suffix and the bare suffix itself.

use domaingate_core::tenant::is_valid_domain_format;
use domaingate_core::{GateError, GateResult, TenantId};
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::{info, warn};

const WILDCARD_PREFIX: &str = "*.";

pub struct DomainWhitelist {
    entries: RwLock<HashSet<String>>,
    enabled: bool,
}

impl DomainWhitelist {
    /// Build from initial entries. Malformed entries are skipped with a warning.
    pub fn new<I, S>(entries: I, enabled: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = collect_entries(entries);
        info!(entries = set.len(), enabled = enabled, "Domain whitelist loaded");
        Self {
            entries: RwLock::new(set),
            enabled,
        }
    }

    /// Swap in a fresh set of entries, discarding runtime additions.
    /// Returns the number of entries now held.
    pub fn replace_all<I, S>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = collect_entries(entries);
        let count = set.len();
        *self.entries.write() = set;
        info!(entries = count, "Domain whitelist reloaded");
        count
    }

    /// Whether membership is enforced at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Always true when the whitelist is disabled.
    pub fn is_allowed(&self, domain: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let domain = domain.trim().to_lowercase();
        let entries = self.entries.read();
        if entries.contains(&domain) {
            return true;
        }
        entries.iter().any(|entry| wildcard_matches(entry, &domain))
    }

    /// Ok if the tenant may be served, else [`GateError::NotWhitelisted`].
    pub fn validate(&self, tenant: &TenantId) -> GateResult<()> {
        if self.is_allowed(tenant.as_str()) {
            return Ok(());
        }
        metrics::counter!("whitelist.rejected").increment(1);
        warn!(event = "domain_not_whitelisted", domain = %tenant, "Domain not whitelisted");
        Err(GateError::NotWhitelisted(tenant.to_string()))
    }

    /// Whether `entry` is literally present (no wildcard expansion).
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.read().contains(&entry.trim().to_lowercase())
    }

    /// Add an entry. Returns false if it was already present.
    pub fn add(&self, raw: &str) -> GateResult<bool> {
        let entry = normalize_entry(raw)?;
        let added = self.entries.write().insert(entry.clone());
        if added {
            info!(event = "domain_added_to_whitelist", domain = %entry, "Domain added to whitelist");
        }
        Ok(added)
    }

    /// Remove an entry. Returns false if it was not present.
    pub fn remove(&self, raw: &str) -> bool {
        let entry = raw.trim().to_lowercase();
        let removed = self.entries.write().remove(&entry);
        if removed {
            info!(event = "domain_removed_from_whitelist", domain = %entry, "Domain removed from whitelist");
        }
        removed
    }

    /// Sorted copy of every entry.
    pub fn snapshot(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.entries.read().iter().cloned().collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn collect_entries<I, S>(entries: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = HashSet::new();
    for raw in entries {
        match normalize_entry(raw.as_ref()) {
            Ok(entry) => {
                set.insert(entry);
            }
            Err(e) => warn!(entry = raw.as_ref(), error = %e, "Skipping whitelist entry"),
        }
    }
    set
}

fn wildcard_matches(entry: &str, domain: &str) -> bool {
    let Some(suffix) = entry.strip_prefix(WILDCARD_PREFIX) else {
        return false;
    };
    domain == suffix
        || domain
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.') && head.len() > 1)
}

fn normalize_entry(raw: &str) -> GateResult<String> {
    let entry = raw.trim().to_lowercase();
    if entry.is_empty() {
        return Err(GateError::InvalidTenant);
    }
    let host = entry.strip_prefix(WILDCARD_PREFIX).unwrap_or(&entry);
    if !is_valid_domain_format(host) {
        return Err(GateError::InvalidTenantFormat(entry));
    }
    Ok(entry)
}
