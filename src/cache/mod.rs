//! Smart Caching
//!
//! A bounded in-memory TTL cache mirrored to the device's durable store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         SmartCache                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  get(key)                                                    │
//! │    │                                                         │
//! │    ├── memory (IndexMap, insertion order) ── live ──> hit    │
//! │    │         └── expired ──> evict memory + durable          │
//! │    │                                                         │
//! │    └── durable store ("cache_" + key)                        │
//! │              ├── live ──> rehydrate memory ──> hit           │
//! │              └── expired / unreadable ──> delete ──> miss    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  • FIFO eviction at capacity     • hourly expiry sweep        │
//! │  • broadcast CacheEvents         • cache-line aligned metrics │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use thimar_offline::cache::{SmartCache, Ttl};
//!
//! let cache = Arc::new(SmartCache::new(store, clock));
//! cache.start_sweeper();
//!
//! cache.set("popular_products", &products, Ttl::hours(24)).await?;
//! let cached: Option<Vec<Product>> = cache.get_as("popular_products").await;
//!
//! println!("Hit ratio: {:.2}%", cache.stats().hit_ratio() * 100.0);
//! cache.destroy();
//! ```

pub mod entry;
pub mod events;
pub mod metrics;
pub mod smart;

// Re-export main types
pub use entry::{CacheEntry, Ttl};
pub use events::{CacheEvent, EvictionReason, HitSource};
pub use metrics::{CacheMetrics, CacheStatsSnapshot, RollingRate};
pub use smart::{SmartCache, SmartCacheConfig};
