use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::fingerprint::CallArgs;
use super::policy::CachePolicy;
use crate::error::CacheError;
use crate::observability::MetricsCollector;

/// Cache entry with expiration time
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        // A TTL too large to represent is clamped to roughly a century
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 3600));
        Self {
            value,
            created_at: now,
            expires_at,
        }
    }

    fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub ttl: Duration,
}

enum Lookup<V> {
    Hit(V),
    Miss,
    Expired,
}

/// Thread-safe in-memory cache with TTL support
pub struct TtlCache<V> {
    store: Mutex<HashMap<String, CacheEntry<V>>>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    default_ttl: Duration,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a new cache with default TTL
    pub fn new(default_ttl: Duration) -> Self {
        info!(ttl_secs = default_ttl.as_secs_f64(), "Cache initialized");
        Self {
            store: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            default_ttl,
            metrics: None,
        }
    }

    /// Report `cached` hits and misses into a shared collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a live value; an expired entry is evicted under the same lock
    pub fn get(&self, key: &str) -> Option<V> {
        let lookup = {
            let mut store = self.store.lock();
            match store.get(key) {
                None => Lookup::Miss,
                Some(entry) if entry.is_expired_at(Instant::now()) => {
                    store.remove(key);
                    Lookup::Expired
                }
                Some(entry) => Lookup::Hit(entry.value.clone()),
            }
        };

        match lookup {
            Lookup::Hit(value) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Lookup::Miss => {
                debug!(key, "Cache miss");
                None
            }
            Lookup::Expired => {
                debug!(key, "Cache expired");
                None
            }
        }
    }

    /// Store a value, overwriting any previous entry for the key
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let entry = CacheEntry::new(value, ttl);
        self.store.lock().insert(key.clone(), entry);
        debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "Cache set");
    }

    /// Remove a key; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.store.lock().remove(key).is_some();
        if removed {
            debug!(key, "Cache deleted");
        }
        removed
    }

    /// Clear all entries; returns how many were removed
    pub fn clear(&self) -> usize {
        let removed = {
            let mut store = self.store.lock();
            let count = store.len();
            store.clear();
            count
        };
        info!(entries_removed = removed, "Cache cleared");
        removed
    }

    /// Remove every expired entry; returns how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let removed = {
            let mut store = self.store.lock();
            let now = Instant::now();
            let initial_len = store.len();
            store.retain(|_, entry| !entry.is_expired_at(now));
            initial_len - store.len()
        };
        if removed > 0 {
            info!(count = removed, "Expired cache entries cleaned");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        let now = Instant::now();
        let total_entries = store.len();
        let expired_entries = store.values().filter(|e| e.is_expired_at(now)).count();

        CacheStats {
            total_entries,
            valid_entries: total_entries - expired_entries,
            expired_entries,
            ttl: self.default_ttl,
        }
    }

    /// Age of a live entry, if present
    pub fn age(&self, key: &str) -> Option<Duration> {
        let store = self.store.lock();
        let entry = store.get(key)?;
        let now = Instant::now();
        (!entry.is_expired_at(now)).then(|| now.duration_since(entry.created_at))
    }

    /// Return the cached result for `identity` + `args`, or run `f` and cache what it returns.
    ///
    /// Errors from `f` are returned as-is and never cached. Concurrent callers with the
    /// same fingerprint wait for the first one instead of invoking `f` themselves.
    pub async fn cached<F, Fut, E>(
        &self,
        identity: &str,
        args: &CallArgs,
        policy: &CachePolicy,
        f: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
        E: From<CacheError>,
    {
        if !policy.enabled {
            return f().await;
        }

        let key = args.fingerprint(identity)?;
        if let Some(value) = self.get(&key) {
            self.record_lookup(true);
            debug!(function = identity, key = %key, "Returning cached result");
            return Ok(value);
        }

        let slot = self.in_flight_slot(&key);
        let result = {
            let _turn = slot.lock().await;
            match self.get(&key) {
                Some(value) => {
                    self.record_lookup(true);
                    debug!(function = identity, key = %key, "Returning cached result");
                    Ok(value)
                }
                None => {
                    self.record_lookup(false);
                    match f().await {
                        Ok(value) => {
                            self.set(key.clone(), value.clone(), policy.ttl);
                            debug!(function = identity, key = %key, "Cached result");
                            Ok(value)
                        }
                        Err(e) => Err(e),
                    }
                }
            }
        };
        self.release_slot(&key, slot);
        result
    }

    fn in_flight_slot(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut in_flight = self.in_flight.lock();
        Arc::clone(in_flight.entry(key.to_string()).or_default())
    }

    fn release_slot(&self, key: &str, slot: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = self.in_flight.lock();
        // Only the map and this caller still hold the slot: nobody is waiting on it.
        // Slots are cloned and dropped only under this lock, so the count is exact.
        let waiting = Arc::strong_count(&slot) > 2;
        drop(slot);
        if !waiting {
            in_flight.remove(key);
        }
    }

    fn record_lookup(&self, hit: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_cache_hit(hit);
        }
    }
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    /// Sweep expired entries every `interval` until the cache is dropped
    pub fn spawn_cleanup(self: &Arc<Self>, interval: Duration) -> JoinHandle<()>
    where
        V: Sync,
    {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        let removed = cache.cleanup_expired();
                        trace!(removed, "Cache cleanup sweep finished");
                    }
                    None => break,
                }
            }
        })
    }
}
