//! Cache Events
//!
//! Events emitted by the smart cache for monitoring and observability.

use serde::{Deserialize, Serialize};

/// Where a hit was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    /// In-memory table
    Memory,
    /// Rehydrated from the durable store
    Durable,
}

/// Events emitted by the cache system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheEvent {
    /// Entry was stored
    Put { key: String, expires: Option<i64> },

    /// Cache hit
    Hit { key: String, source: HitSource },

    /// Cache miss
    Miss { key: String },

    /// Entry was removed from the cache
    Evict { key: String, reason: EvictionReason },

    /// Background sweep finished
    Swept { removed: usize },

    /// Mirroring to the durable store failed (entry kept in memory only)
    PersistFailed { key: String, error: String },
}

/// Reason for eviction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    /// Capacity limit reached
    Capacity,
    /// Entry expired (TTL)
    Expired,
    /// Manual removal
    Manual,
    /// Durable copy could not be parsed
    Corrupted,
}

impl std::fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionReason::Capacity => write!(f, "capacity"),
            EvictionReason::Expired => write!(f, "expired"),
            EvictionReason::Manual => write!(f, "manual"),
            EvictionReason::Corrupted => write!(f, "corrupted"),
        }
    }
}

impl CacheEvent {
    /// Create an Evict event
    pub fn evict(key: &str, reason: EvictionReason) -> Self {
        CacheEvent::Evict {
            key: key.to_string(),
            reason,
        }
    }

    /// Get the key associated with this event (if any)
    pub fn key(&self) -> Option<&str> {
        match self {
            CacheEvent::Put { key, .. } => Some(key),
            CacheEvent::Hit { key, .. } => Some(key),
            CacheEvent::Miss { key } => Some(key),
            CacheEvent::Evict { key, .. } => Some(key),
            CacheEvent::PersistFailed { key, .. } => Some(key),
            CacheEvent::Swept { .. } => None,
        }
    }

    /// Check if this is an error event
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CacheEvent::PersistFailed { .. }
                | CacheEvent::Evict {
                    reason: EvictionReason::Corrupted,
                    ..
                }
        )
    }
}
