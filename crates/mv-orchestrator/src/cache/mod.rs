//! Gateway cache
//!
//! A per-key TTL cache over gateway lists and account identifiers. Entries
//! without an expiry live until overwritten or invalidated. An expired entry
//! is never served as fresh; it can be read exactly once more as a stale
//! fallback, which also removes it.
//!
//! # Atomicity Model
//!
//! Each per-key operation is atomic through the sharded map's entry API and
//! holds the read side of `gate`. `clear()` takes the write side, so a `set`
//! that linearizes after a clear is kept, and one that started before it is
//! either fully visible to the clear or fully discarded by it.

mod key;

pub use key::CacheKey;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use mv_core::error::CacheError;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expiry: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }
}

/// Concurrent TTL cache keyed by [`CacheKey`]
#[derive(Debug, Default)]
pub struct GatewayCache {
    /// Coordination lock; guards no data
    gate: RwLock<()>,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl GatewayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a value
    ///
    /// Fresh entries are returned as-is. An expired entry is always removed;
    /// its value is returned only when `allow_stale` is set.
    pub async fn get<T: DeserializeOwned>(&self, key: CacheKey, allow_stale: bool) -> Option<T> {
        let _gate = self.gate.read().await;
        let now = Instant::now();

        let value = match self.entries.entry(key) {
            Entry::Vacant(_) => return None,
            Entry::Occupied(entry) if entry.get().is_expired(now) => {
                let stale = entry.remove();
                tracing::debug!(key = %key, allow_stale, "Cache entry expired");
                if !allow_stale {
                    return None;
                }
                stale.value
            }
            Entry::Occupied(entry) => {
                let value = entry.get().value.clone();
                match serde_json::from_value(value) {
                    Ok(v) => return Some(v),
                    Err(e) => {
                        tracing::warn!(key = %key, "Dropping unreadable cache entry: {}", e);
                        entry.remove();
                        return None;
                    }
                }
            }
        };

        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, "Dropping unreadable stale cache entry: {}", e);
                None
            }
        }
    }

    /// Read a value only if it is still fresh
    ///
    /// Unlike [`get`](Self::get), an expired entry is left in place so a
    /// later stale read can still fall back on it.
    pub async fn get_fresh<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let _gate = self.gate.read().await;
        let value = self
            .entries
            .get(&key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())?;

        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = %key, "Dropping unreadable cache entry: {}", e);
                self.entries.remove(&key);
                None
            }
        }
    }

    /// Store a value, replacing any previous entry
    ///
    /// `ttl = None` caches forever.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(value)?;
        let _gate = self.gate.read().await;
        let expiry = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key, CacheEntry { value, expiry });
        tracing::trace!(key = %key, ?ttl, "Cache entry stored");
        Ok(())
    }

    /// Remove a single key
    pub async fn delete(&self, key: CacheKey) {
        let _gate = self.gate.read().await;
        self.entries.remove(&key);
    }

    /// Remove every known key
    pub async fn clear(&self) {
        let _gate = self.gate.write().await;
        self.entries.clear();
        tracing::debug!("Cache cleared");
    }

    /// Drop every gateway list and identifier, as on an environment switch
    ///
    /// Exclusive like [`clear`](Self::clear).
    pub async fn invalidate_gateways(&self) {
        let _gate = self.gate.write().await;
        for key in CacheKey::ALL {
            self.entries.remove(&key);
        }
        tracing::debug!("Gateway and identity caches invalidated");
    }

    /// Drop the account and device identifiers
    pub async fn invalidate_identity(&self) {
        let _gate = self.gate.read().await;
        for key in CacheKey::IDENTITY {
            self.entries.remove(&key);
        }
    }

    /// Whether an entry exists for `key`, fresh or stale
    pub fn contains(&self, key: CacheKey) -> bool {
        self.entries.contains_key(&key)
    }
}
