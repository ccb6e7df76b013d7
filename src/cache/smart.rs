//! Smart Cache
//!
//! Bounded in-memory table with per-entry TTL, mirrored to the durable
//! store so a cold start can rehydrate entries lazily on first access.
//!
//! Expiry is enforced at read time: an expired entry is removed from both
//! memory and the durable store the first time it is observed. The
//! background sweeper only reclaims memory early.

use crate::cache::entry::{CacheEntry, Ttl};
use crate::cache::events::{CacheEvent, EvictionReason, HitSource};
use crate::cache::metrics::{CacheMetrics, CacheStatsSnapshot};
use crate::domain::ports::{ClockRef, DurableStoreRef};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the smart cache
#[derive(Debug, Clone)]
pub struct SmartCacheConfig {
    /// Maximum entries held in memory
    pub capacity: usize,
    /// Period of the background expiry sweep
    pub sweep_interval: Duration,
    /// Prefix applied to keys mirrored into the durable store
    pub key_prefix: String,
    /// Event channel capacity
    pub event_channel_capacity: usize,
}

impl Default for SmartCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            sweep_interval: Duration::from_secs(60 * 60),
            key_prefix: "cache_".to_string(),
            event_channel_capacity: 256,
        }
    }
}

// =============================================================================
// Smart Cache
// =============================================================================

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// TTL cache with insertion-order eviction and a durable mirror
pub struct SmartCache {
    /// Live entries in insertion order (front = oldest)
    memory: Mutex<IndexMap<String, CacheEntry>>,
    /// Durable mirror
    store: DurableStoreRef,
    /// Time source for expiry
    clock: ClockRef,
    /// Counters
    metrics: CacheMetrics,
    /// Configuration
    config: SmartCacheConfig,
    /// Event broadcaster
    event_tx: broadcast::Sender<CacheEvent>,
    /// Background sweep task, if started
    sweeper: Mutex<Option<Sweeper>>,
}

impl SmartCache {
    /// Create a cache with default configuration
    pub fn new(store: DurableStoreRef, clock: ClockRef) -> Self {
        Self::with_config(store, clock, SmartCacheConfig::default())
    }

    /// Create a cache with custom configuration
    pub fn with_config(store: DurableStoreRef, clock: ClockRef, config: SmartCacheConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        debug!(
            capacity = config.capacity,
            store = store.store_name(),
            "Smart cache created"
        );

        Self {
            memory: Mutex::new(IndexMap::with_capacity(config.capacity)),
            store,
            clock,
            metrics: CacheMetrics::new(),
            config,
            event_tx,
            sweeper: Mutex::new(None),
        }
    }

    /// Subscribe to cache events
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    /// Emit a cache event
    fn emit_event(&self, event: CacheEvent) {
        let _ = self.event_tx.send(event);
    }

    fn durable_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Insert into memory, evicting the oldest entry when full
    ///
    /// Re-inserting an existing key moves it to the back of the order.
    fn insert_memory(&self, key: &str, entry: CacheEntry) -> Option<String> {
        let mut memory = self.memory.lock();

        let evicted = if memory.shift_remove(key).is_none()
            && self.config.capacity > 0
            && memory.len() >= self.config.capacity
        {
            memory.shift_remove_index(0).map(|(k, _)| k)
        } else {
            None
        };

        if self.config.capacity > 0 {
            memory.insert(key.to_string(), entry);
        }
        evicted
    }

    /// Store `data` under `key` until `ttl` elapses
    ///
    /// Only an invalid key or an unserializable value is an error. A failed
    /// durable mirror write is logged and the entry stays memory-only.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Ttl) -> Result<()> {
        if key.trim().is_empty() {
            return Err(Error::InvalidKey(key.to_string()));
        }

        let entry = CacheEntry::new(serde_json::to_value(data)?, self.clock.now_ms(), ttl);
        let raw = serde_json::to_string(&entry)?;
        let expires = entry.expires;

        if let Some(evicted) = self.insert_memory(key, entry) {
            self.metrics.record_eviction();
            debug!(key = %evicted, "Evicted oldest cache entry");
            self.emit_event(CacheEvent::evict(&evicted, EvictionReason::Capacity));
        }
        self.metrics.record_put();
        self.emit_event(CacheEvent::Put {
            key: key.to_string(),
            expires,
        });

        if let Err(e) = self.store.set_item(&self.durable_key(key), &raw).await {
            warn!(key = %key, error = %e, "Failed to mirror cache entry to durable store");
            self.metrics.record_persist_failure();
            self.emit_event(CacheEvent::PersistFailed {
                key: key.to_string(),
                error: e.to_string(),
            });
        }

        Ok(())
    }

    /// Look up `key`, falling back to the durable mirror on a memory miss
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();

        let memory_state = {
            let mut memory = self.memory.lock();
            match memory.get(key) {
                Some(entry) if entry.is_expired(now) => {
                    memory.shift_remove(key);
                    Some(None)
                }
                Some(entry) => Some(Some(entry.data.clone())),
                None => None,
            }
        };

        match memory_state {
            Some(Some(data)) => {
                self.metrics.record_memory_hit();
                self.emit_event(CacheEvent::Hit {
                    key: key.to_string(),
                    source: HitSource::Memory,
                });
                return Some(data);
            }
            Some(None) => {
                self.expire(key).await;
                return None;
            }
            None => {}
        }

        let durable_key = self.durable_key(key);
        let raw = match self.store.get_item(&durable_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.record_miss(key);
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Durable cache read failed, treating as miss");
                self.record_miss(key);
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding unreadable durable cache entry");
                self.remove_durable(&durable_key).await;
                self.metrics.record_miss();
                self.emit_event(CacheEvent::evict(key, EvictionReason::Corrupted));
                return None;
            }
        };

        if entry.is_expired(now) {
            self.expire(key).await;
            return None;
        }

        let data = entry.data.clone();
        if let Some(evicted) = self.insert_memory(key, entry) {
            self.metrics.record_eviction();
            self.emit_event(CacheEvent::evict(&evicted, EvictionReason::Capacity));
        }
        self.metrics.record_durable_hit();
        self.emit_event(CacheEvent::Hit {
            key: key.to_string(),
            source: HitSource::Durable,
        });
        debug!(key = %key, "Rehydrated cache entry from durable store");
        Some(data)
    }

    /// Typed lookup; a value that no longer fits `T` is a miss
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape");
                None
            }
        }
    }

    /// Remove `key` from memory and the durable mirror
    pub async fn remove(&self, key: &str) -> bool {
        let removed = self.memory.lock().shift_remove(key).is_some();
        self.remove_durable(&self.durable_key(key)).await;
        self.emit_event(CacheEvent::evict(key, EvictionReason::Manual));
        removed
    }

    /// Drop every entry this cache owns, in memory and durably
    pub async fn clear(&self) {
        self.memory.lock().clear();

        match self.store.keys().await {
            Ok(keys) => {
                let owned: Vec<&str> = keys
                    .iter()
                    .map(String::as_str)
                    .filter(|k| k.starts_with(&self.config.key_prefix))
                    .collect();
                if let Err(e) = self.store.multi_remove(&owned).await {
                    warn!(error = %e, "Failed to clear durable cache entries");
                }
            }
            Err(e) => warn!(error = %e, "Failed to list durable cache entries"),
        }
    }

    /// Entries currently held in memory
    pub fn len(&self) -> usize {
        self.memory.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.lock().is_empty()
    }

    /// Remove every expired entry from memory; returns the number removed
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let removed = {
            let mut memory = self.memory.lock();
            let before = memory.len();
            memory.retain(|_, entry| !entry.is_expired(now));
            before - memory.len()
        };

        if removed > 0 {
            self.metrics.record_expirations(removed as u64);
            debug!(removed, "Swept expired cache entries");
        }
        self.emit_event(CacheEvent::Swept { removed });
        removed
    }

    /// Start the periodic sweep; a second call is a no-op
    pub fn start_sweeper(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = weak.upgrade() else { break };
                        cache.sweep();
                    }
                }
            }
            debug!("Cache sweeper stopped");
        });

        info!(interval = ?period, "Cache sweeper started");
        *slot = Some(Sweeper { cancel, handle });
    }

    /// Whether the background sweep is running
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Stop the periodic sweep; idempotent
    pub fn destroy(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.cancel.cancel();
            info!("Cache sweeper cancelled");
        }
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.metrics.snapshot(self.len())
    }

    fn record_miss(&self, key: &str) {
        self.metrics.record_miss();
        self.emit_event(CacheEvent::Miss {
            key: key.to_string(),
        });
    }

    async fn expire(&self, key: &str) {
        self.remove_durable(&self.durable_key(key)).await;
        self.metrics.record_expirations(1);
        self.metrics.record_miss();
        debug!(key = %key, "Cache entry expired");
        self.emit_event(CacheEvent::evict(key, EvictionReason::Expired));
    }

    async fn remove_durable(&self, durable_key: &str) {
        if let Err(e) = self.store.remove_item(durable_key).await {
            warn!(key = %durable_key, error = %e, "Failed to remove durable cache entry");
        }
    }
}

impl Drop for SmartCache {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::ports::DurableStore;
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn setup(capacity: usize) -> (SmartCache, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = SmartCache::with_config(
            store.clone(),
            clock.clone(),
            SmartCacheConfig {
                capacity,
                ..Default::default()
            },
        );
        (cache, store, clock)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (cache, _store, _clock) = setup(10);

        cache.set("products", &json!([{"id": "1"}]), Ttl::hours(24)).await.unwrap();
        assert_eq!(cache.get("products").await, Some(json!([{"id": "1"}])));
        assert_eq!(cache.stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed_everywhere() {
        let (cache, store, clock) = setup(10);

        cache.set("products", &json!([1]), Ttl::hours(24)).await.unwrap();
        assert!(store.get_item("cache_products").await.unwrap().is_some());

        clock.advance(Duration::from_secs(25 * 60 * 60));
        assert_eq!(cache.get("products").await, None);
        assert!(store.get_item("cache_products").await.unwrap().is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_forever_entry_survives_time() {
        let (cache, _store, clock) = setup(10);

        cache.set("voice", &json!({"ar": ["أضف"]}), Ttl::Forever).await.unwrap();
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert!(cache.get("voice").await.is_some());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_inserted() {
        let (cache, _store, _clock) = setup(2);
        let mut events = cache.subscribe();

        cache.set("a", &1, Ttl::Forever).await.unwrap();
        cache.set("b", &2, Ttl::Forever).await.unwrap();
        cache.set("c", &3, Ttl::Forever).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);

        let mut saw_eviction = false;
        while let Ok(event) = events.try_recv() {
            if let CacheEvent::Evict { key, reason } = event {
                assert_eq!(key, "a");
                assert_eq!(reason, EvictionReason::Capacity);
                saw_eviction = true;
            }
        }
        assert!(saw_eviction);
    }

    #[tokio::test]
    async fn test_cold_start_rehydrates_from_durable() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));

        {
            let cache = SmartCache::new(store.clone(), clock.clone());
            cache.set("categories", &json!(["dates"]), Ttl::days(7)).await.unwrap();
        }

        let cache = SmartCache::new(store.clone(), clock.clone());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.get("categories").await, Some(json!(["dates"])));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().durable_hits, 1);
    }

    #[tokio::test]
    async fn test_expired_durable_entry_is_deleted() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));

        {
            let cache = SmartCache::new(store.clone(), clock.clone());
            cache.set("k", &"v", Ttl::For(Duration::from_secs(1))).await.unwrap();
        }
        clock.advance(Duration::from_secs(2));

        let cache = SmartCache::new(store.clone(), clock);
        assert_eq!(cache.get("k").await, None);
        assert!(store.get_item("cache_k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_durable_entry_is_discarded() {
        let (cache, store, _clock) = setup(10);
        store.set_item("cache_broken", "not json").await.unwrap();

        assert_eq!(cache.get("broken").await, None);
        assert!(store.get_item("cache_broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_memory_only() {
        let (cache, store, _clock) = setup(10);
        store.set_available(false);

        cache.set("k", &42, Ttl::Forever).await.unwrap();
        assert_eq!(cache.get("k").await, Some(json!(42)));
        assert_eq!(cache.get("missing").await, None);
        assert_eq!(cache.stats().persist_failures, 1);
    }

    #[tokio::test]
    async fn test_blank_key_is_rejected() {
        let (cache, _store, _clock) = setup(10);
        assert_matches!(cache.set(" ", &1, Ttl::Forever).await, Err(Error::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_memory() {
        let (cache, _store, clock) = setup(10);

        cache.set("short", &1, Ttl::For(Duration::from_secs(10))).await.unwrap();
        cache.set("long", &2, Ttl::hours(1)).await.unwrap();
        clock.advance(Duration::from_secs(60));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_get_as_and_clear() {
        let (cache, store, _clock) = setup(10);
        store.set_item("offline_cart", "[]").await.unwrap();

        cache.set("ids", &vec!["a", "b"], Ttl::Forever).await.unwrap();
        let ids: Vec<String> = cache.get_as("ids").await.unwrap();
        assert_eq!(ids, vec!["a", "b"]);

        cache.clear().await;
        assert!(cache.is_empty());
        assert_eq!(store.keys().await.unwrap(), vec!["offline_cart".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(0));
        let cache = Arc::new(SmartCache::with_config(
            store,
            clock.clone(),
            SmartCacheConfig {
                sweep_interval: Duration::from_secs(60),
                ..Default::default()
            },
        ));

        cache.set("k", &1, Ttl::For(Duration::from_secs(1))).await.unwrap();
        clock.advance(Duration::from_secs(5));

        cache.start_sweeper();
        cache.start_sweeper();
        assert!(cache.is_sweeping());

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(cache.len(), 0);

        cache.destroy();
        cache.destroy();
        assert!(!cache.is_sweeping());
    }
}
