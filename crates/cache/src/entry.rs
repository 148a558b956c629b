//! Cached values and their timing metadata.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Size assumed for a numeric value.
const NUMBER_SIZE_BYTES: usize = 8;

/// Opaque value stored for a tenant. The cache never interprets it;
/// serialising report data into one of these is the caller's job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CacheValue {
    Bytes(Bytes),
    Text(String),
    Number(f64),
    Json(serde_json::Value),
}

impl CacheValue {
    /// Best-effort size estimate, informational only.
    pub fn estimated_size(&self) -> usize {
        match self {
            CacheValue::Bytes(b) => b.len(),
            CacheValue::Text(s) => s.len(),
            CacheValue::Number(_) => NUMBER_SIZE_BYTES,
            CacheValue::Json(v) => serde_json::to_vec(v)
                .map(|encoded| encoded.len())
                .unwrap_or_else(|_| v.to_string().len()),
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            CacheValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CacheValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Bytes> for CacheValue {
    fn from(b: Bytes) -> Self {
        CacheValue::Bytes(b)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(b: Vec<u8>) -> Self {
        CacheValue::Bytes(Bytes::from(b))
    }
}

impl From<String> for CacheValue {
    fn from(s: String) -> Self {
        CacheValue::Text(s)
    }
}

impl From<&str> for CacheValue {
    fn from(s: &str) -> Self {
        CacheValue::Text(s.to_string())
    }
}

impl From<f64> for CacheValue {
    fn from(n: f64) -> Self {
        CacheValue::Number(n)
    }
}

impl From<i64> for CacheValue {
    fn from(n: i64) -> Self {
        CacheValue::Number(n as f64)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(v: serde_json::Value) -> Self {
        CacheValue::Json(v)
    }
}

/// A single timed value. `expires_at >= created_at` always holds.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: CacheValue, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = ttl.max(Duration::zero());
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            created_at: now,
            expires_at,
            access_count: 0,
            last_accessed: now,
        }
    }

    /// A zero TTL entry is already expired at its creation instant.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Record a hit and hand back the value. Does not touch `expires_at`.
    pub fn access(&mut self, now: DateTime<Utc>) -> CacheValue {
        self.access_count += 1;
        self.last_accessed = now;
        self.value.clone()
    }
}
