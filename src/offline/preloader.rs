//! Data Preloader
//!
//! Seeds the offline store (and the smart cache, when given one) with the
//! bundled fixtures at cold start. Steps are independent: a failing step
//! is logged and recorded in the report, and the rest still run. Every
//! step overwrites, so running the preloader again changes nothing.

use crate::cache::{SmartCache, Ttl};
use crate::error::Result;
use crate::offline::fixtures;
use crate::offline::manager::OfflineStorageManager;
use crate::storage::StorageKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// One unit of preload work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadStep {
    Localization,
    VoiceCommands,
    Categories,
    PopularProducts,
}

impl PreloadStep {
    pub fn all() -> [PreloadStep; 4] {
        [
            PreloadStep::Localization,
            PreloadStep::VoiceCommands,
            PreloadStep::Categories,
            PreloadStep::PopularProducts,
        ]
    }
}

impl fmt::Display for PreloadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreloadStep::Localization => write!(f, "localization"),
            PreloadStep::VoiceCommands => write!(f, "voice_commands"),
            PreloadStep::Categories => write!(f, "categories"),
            PreloadStep::PopularProducts => write!(f, "popular_products"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step: PreloadStep,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a preload run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreloadReport {
    pub steps: Vec<StepResult>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.error.is_none())
    }

    pub fn failed(&self) -> Vec<PreloadStep> {
        self.steps
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.step)
            .collect()
    }
}

pub struct DataPreloader {
    manager: Arc<OfflineStorageManager>,
    cache: Option<Arc<SmartCache>>,
}

impl DataPreloader {
    pub fn new(manager: Arc<OfflineStorageManager>) -> Self {
        Self {
            manager,
            cache: None,
        }
    }

    /// Also mirror the voice command table into `cache`
    pub fn with_cache(mut self, cache: Arc<SmartCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run every step; never fails as a whole
    pub async fn preload_essential_data(&self) -> PreloadReport {
        info!("Starting essential data preload");
        let mut report = PreloadReport::default();

        for step in PreloadStep::all() {
            let started = Instant::now();
            let result = self.run_step(step).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(()) => None,
                Err(e) => {
                    error!(step = %step, error = %e, "Preload step failed");
                    Some(e.to_string())
                }
            };
            report.steps.push(StepResult {
                step,
                duration_ms,
                error,
            });
        }

        info!(
            complete = report.is_complete(),
            failed = report.failed().len(),
            "Essential data preload finished"
        );
        report
    }

    async fn run_step(&self, step: PreloadStep) -> Result<()> {
        match step {
            PreloadStep::Localization => {
                self.manager
                    .save_data(
                        fixtures::ARABIC_LOCALIZATION_KEY,
                        &fixtures::arabic_localization(),
                        Ttl::Forever,
                    )
                    .await?;
                self.manager
                    .save_data(
                        fixtures::ENGLISH_LOCALIZATION_KEY,
                        &fixtures::english_localization(),
                        Ttl::Forever,
                    )
                    .await
            }
            PreloadStep::VoiceCommands => {
                let table = fixtures::voice_commands();
                let key = StorageKey::VoiceCache.as_str();
                self.manager.save_data(key, &table, Ttl::Forever).await?;
                if let Some(cache) = &self.cache {
                    cache.set(key, &table, Ttl::Forever).await?;
                }
                Ok(())
            }
            PreloadStep::Categories => {
                self.manager.cache_categories(&fixtures::categories()).await
            }
            PreloadStep::PopularProducts => {
                self.manager
                    .cache_products(&fixtures::popular_products())
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::network::NetworkTier;
    use crate::offline::fixtures::VoiceCommandTable;
    use crate::offline::manager::OfflineManagerConfig;
    use crate::offline::sync::LoggingSyncEndpoint;
    use crate::storage::MemoryStore;
    use tokio::sync::watch;

    async fn manager(store: Arc<MemoryStore>) -> Arc<OfflineStorageManager> {
        let (_tx, rx) = watch::channel(NetworkTier::Wifi);
        OfflineStorageManager::open(
            store,
            Arc::new(ManualClock::new(0)),
            Arc::new(LoggingSyncEndpoint::new()),
            rx,
            OfflineManagerConfig::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_preload_is_idempotent() {
        let manager = manager(Arc::new(MemoryStore::new())).await;
        let preloader = DataPreloader::new(Arc::clone(&manager));

        let first = preloader.preload_essential_data().await;
        assert!(first.is_complete());
        assert_eq!(first.steps.len(), 4);
        let categories = manager.get_cached_categories().await;
        let products = manager.get_cached_products().await;

        preloader.preload_essential_data().await;
        assert_eq!(manager.get_cached_categories().await, categories);
        assert_eq!(manager.get_cached_products().await, products);
        assert_eq!(categories.len(), 5);
        assert_eq!(products.len(), 3);
    }

    #[tokio::test]
    async fn test_voice_commands_mirrored_into_cache() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone()).await;
        let cache = Arc::new(SmartCache::new(store, Arc::new(ManualClock::new(0))));

        DataPreloader::new(Arc::clone(&manager))
            .with_cache(Arc::clone(&cache))
            .preload_essential_data()
            .await;

        let cached: VoiceCommandTable = cache.get_as("voice_commands_cache").await.unwrap();
        assert_eq!(cached.resolve("اذهب إلى السلة"), Some("navigate_cart"));
        let stored: VoiceCommandTable = manager.get_data("voice_commands_cache").await.unwrap();
        assert_eq!(stored, cached);
    }

    #[tokio::test]
    async fn test_failed_step_does_not_abort_others() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone()).await;
        store.set_available(false);

        let report = DataPreloader::new(manager).preload_essential_data().await;
        assert!(!report.is_complete());
        assert_eq!(report.steps.len(), 4);
        assert_eq!(report.failed(), PreloadStep::all().to_vec());
    }
}
