//! Thimar Offline - Offline-First Sync and Network-Adaptive Caching
//!
//! The storage engine behind a bilingual storefront that must keep working
//! on flaky or absent connectivity: a TTL cache mirrored to device storage,
//! a durable outbox of cart and favorite changes, and a network tier
//! classifier that tunes image quality, timeouts and sync behavior.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                       OfflineStorageManager                          │
//! │   cart · preferences · catalog caches · search history · migration   │
//! │  ┌────────────────────┐   ┌──────────────┐   ┌────────────────────┐  │
//! │  │ Outbox (priority)  │──>│  sync pass   │──>│   SyncEndpoint     │  │
//! │  └────────────────────┘   └──────┬───────┘   └────────────────────┘  │
//! ├──────────────────────────────────┼───────────────────────────────────┤
//! │                                  │ tier (watch)                      │
//! │  ┌───────────────────────────────┴──────────────────────────────┐    │
//! │  │              NetworkAdaptationManager                        │    │
//! │  │  ConnectivityProbe ─> NetworkTier ─> AdaptationPolicy        │    │
//! │  │  OptimizedImageLoader         SmartCache (memory + durable)  │    │
//! │  └──────────────────────────────────────────────────────────────┘    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │               DurableStore: MemoryStore | FileStore                  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: SmartCache with TTL entries, eviction and expiry sweep
//! - [`network`]: Tier classification, adaptation policies, image loading
//! - [`offline`]: Offline storage manager, outbox, preloader
//! - [`storage`]: Durable store adapters and the managed key namespace
//! - [`monitor`]: Named performance timers
//! - [`config`]: YAML configuration
//! - [`domain`]: Ports and catalog types
//! - [`error`]: Error types and handling

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod monitor;
pub mod network;
pub mod offline;
pub mod storage;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheEvent, CacheStatsSnapshot, SmartCache, SmartCacheConfig, Ttl};

pub use config::OfflineConfig;

pub use domain::{
    Category, Clock, ConnectivityProbe, ConnectivitySample, DurableStore, ImageTransformer,
    ManualClock, Product, SyncEndpoint, SystemClock, UserPreferences,
};

pub use error::{Error, Result};

pub use monitor::{PerformanceMonitor, PerformanceReport};

pub use network::{
    AdaptationPolicy, NetworkAdaptationManager, NetworkManagerConfig, NetworkTier,
    OptimizedImageLoader, StaticProbe, TcpProbe,
};

pub use offline::{
    ActionPriority, ActionType, CartLine, DataPreloader, LoggingSyncEndpoint,
    OfflineManagerConfig, OfflineStorageManager, PendingAction, StorageStats, SyncOutcome,
    SyncStatus,
};

pub use storage::{FileStore, MemoryStore, StorageKey};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
