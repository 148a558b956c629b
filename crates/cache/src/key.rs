//! Cache key derivation.

use domaingate_core::TenantId;
use sha2::{Digest, Sha256};

/// Hash `(tenant, key)` into a fixed-length hex slot name.
///
/// The tenant id is length-prefixed so no `(tenant, key)` split of the same
/// byte string can produce the same material.
pub fn cache_key(tenant: &TenantId, key: &str) -> String {
    let tenant = tenant.as_str();
    let mut hasher = Sha256::new();
    hasher.update(b"domain:");
    hasher.update(tenant.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(tenant.as_bytes());
    hasher.update(b":key:");
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
