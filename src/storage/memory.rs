//! In-Memory Durable Store
//!
//! DashMap-backed implementation of the durable store port. Nothing
//! survives the process, but a single instance can be shared across
//! manager instances to simulate a restart.

use crate::domain::ports::DurableStore;
use crate::error::{Error, Result};
use crate::storage::validate_key;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Durable store held entirely in memory
pub struct MemoryStore {
    /// Raw values by key
    entries: DashMap<String, String>,
    /// Number of writes performed (diagnostics)
    writes: AtomicU64,
    /// Is the store accepting operations
    available: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Set availability (for testing transient failures)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Check if available
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total writes since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.is_available() {
            return Err(Error::StoreUnavailable {
                store: "memory".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.ensure_available()?;
        validate_key(key)?;
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_available()?;
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.ensure_available()?;
        validate_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.ensure_available()?;
        Ok(self.entries.iter().map(|r| r.key().clone()).collect())
    }

    fn store_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set_item("offline_cart", "[]").await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get_item("offline_cart").await.unwrap().as_deref(),
            Some("[]")
        );

        store.remove_item("offline_cart").await.unwrap();
        assert!(store.get_item("offline_cart").await.unwrap().is_none());

        // Removing an absent key is fine
        store.remove_item("offline_cart").await.unwrap();
    }

    #[tokio::test]
    async fn test_multi_remove() {
        let store = MemoryStore::new();
        store.set_item("a", "1").await.unwrap();
        store.set_item("b", "2").await.unwrap();
        store.set_item("c", "3").await.unwrap();

        store.multi_remove(&["a", "b"]).await.unwrap();

        assert_eq!(store.keys().await.unwrap(), vec!["c".to_string()]);
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(store.get_item("k").await.is_err());
        assert!(store.set_item("k", "v").await.is_err());

        store.set_available(true);
        assert!(store.set_item("k", "v").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_blank_key() {
        let store = MemoryStore::new();
        let err = store.set_item("", "v").await.unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
