//! Best-effort write-through cache for fetched bars.
//!
//! The real store is an external key/value table with TTLs. The chain only
//! needs `get`/`set`; failures are logged by the caller and never surface.

use super::provider::ProviderKind;
use crate::domain::Bar;
use crate::time::Interval;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache backend unavailable: {0}")]
    Backend(String),
}

/// Key/value store consulted by [`FallbackChain`](super::FallbackChain).
///
/// Both methods run inline on the async task serving the request, so they
/// must return promptly. A backend with slow writes should enqueue the value
/// and persist it from its own task or thread.
pub trait BarCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` for `ttl`. An error is logged by the caller and dropped.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Serialized form of a successful fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CachedBars {
    pub provider: ProviderKind,
    pub bars: Vec<Bar>,
}

/// Stable key for a bars request: `bars:<first 32 hex chars of blake3>`.
pub fn cache_key(symbol: &str, interval: Interval, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(b"|");
    hasher.update(interval.token().as_bytes());
    hasher.update(b"|");
    hasher.update(&from.timestamp_millis().to_le_bytes());
    hasher.update(&to.timestamp_millis().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("bars:{}", &hex.as_str()[..32])
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process cache with per-entry expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.lock().retain(|_, e| e.expires_at > now);
    }
}

impl BarCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        (entry.expires_at > Instant::now()).then(|| entry.value.clone())
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("ttl {ttl:?} overflows")))?;
        self.entries
            .lock()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }
}
