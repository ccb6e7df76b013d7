//! Durable Store Adapters
//!
//! Implementations of the [`DurableStore`](crate::domain::ports::DurableStore)
//! port, plus the namespace of keys the offline engine manages.
//!
//! - [`MemoryStore`]: DashMap-backed store (tests, `--in-memory` runs)
//! - [`FileStore`]: one JSON file per key under a data directory

mod file;
mod memory;

pub use file::{FileStore, FileStoreConfig};
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Managed Key Namespace
// =============================================================================

/// Keys owned by the offline storage manager
///
/// Each key is independently readable and removable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKey {
    Products,
    Categories,
    UserCart,
    UserPreferences,
    PendingActions,
    SearchHistory,
    VoiceCache,
    Images,
    LastSync,
    AppVersion,
}

impl StorageKey {
    /// The raw key written to the durable store
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::Products => "offline_products",
            StorageKey::Categories => "offline_categories",
            StorageKey::UserCart => "offline_cart",
            StorageKey::UserPreferences => "offline_preferences",
            StorageKey::PendingActions => "pending_actions",
            StorageKey::SearchHistory => "search_history",
            StorageKey::VoiceCache => "voice_commands_cache",
            StorageKey::Images => "cached_images",
            StorageKey::LastSync => "last_sync_timestamp",
            StorageKey::AppVersion => "app_version",
        }
    }

    /// Stable label used in storage reports
    pub fn label(&self) -> &'static str {
        match self {
            StorageKey::Products => "PRODUCTS",
            StorageKey::Categories => "CATEGORIES",
            StorageKey::UserCart => "USER_CART",
            StorageKey::UserPreferences => "USER_PREFERENCES",
            StorageKey::PendingActions => "PENDING_ACTIONS",
            StorageKey::SearchHistory => "SEARCH_HISTORY",
            StorageKey::VoiceCache => "VOICE_CACHE",
            StorageKey::Images => "IMAGES",
            StorageKey::LastSync => "LAST_SYNC",
            StorageKey::AppVersion => "APP_VERSION",
        }
    }

    /// Every managed key, in report order
    pub fn all() -> &'static [StorageKey] {
        &[
            StorageKey::Products,
            StorageKey::Categories,
            StorageKey::UserCart,
            StorageKey::UserPreferences,
            StorageKey::PendingActions,
            StorageKey::SearchHistory,
            StorageKey::VoiceCache,
            StorageKey::Images,
            StorageKey::LastSync,
            StorageKey::AppVersion,
        ]
    }

    /// Cached catalog data dropped when the device has not synced for too long
    pub fn stale_cache_keys() -> &'static [StorageKey] {
        &[
            StorageKey::Products,
            StorageKey::Categories,
            StorageKey::SearchHistory,
            StorageKey::Images,
        ]
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject keys no adapter can store
pub(crate) fn validate_key(key: &str) -> crate::error::Result<()> {
    if key.trim().is_empty() {
        return Err(crate::error::Error::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_distinct() {
        let raw: HashSet<&str> = StorageKey::all().iter().map(|k| k.as_str()).collect();
        assert_eq!(raw.len(), StorageKey::all().len());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(StorageKey::PendingActions.to_string(), "pending_actions");
        assert_eq!(StorageKey::UserCart.label(), "USER_CART");
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("offline_cart").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("   ").is_err());
    }
}
