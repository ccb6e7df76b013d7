//! Network Adaptation Manager
//!
//! Polls connectivity, classifies it into a [`NetworkTier`], and hands out
//! the matching adaptation policy. The current tier is published on a
//! `watch` channel so the offline storage manager and any UI layer can
//! follow it without polling.

use crate::cache::{RollingRate, SmartCache, Ttl};
use crate::domain::ports::{ConnectivityProbeRef, ConnectivitySample, ImageDimensions};
use crate::network::image::OptimizedImageLoader;
use crate::network::tier::{AdaptationPolicy, BundleConfig, NetworkTier, PrefetchStrategy};
use crate::error::Result;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the network adaptation manager
#[derive(Debug, Clone)]
pub struct NetworkManagerConfig {
    /// How often connectivity is sampled
    pub poll_interval: Duration,
    /// Tier assumed before the first sample
    pub initial_tier: NetworkTier,
}

impl Default for NetworkManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            initial_tier: NetworkTier::Wifi,
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Point-in-time view of network conditions and cache effectiveness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkMetrics {
    pub network_type: NetworkTier,
    /// Kbps, from the last sample that reported it
    pub download_speed: f64,
    /// Milliseconds, from the last sample that reported it
    pub latency: u64,
    /// Rolling cache hit rate in [0, 1]
    pub cache_hit_rate: f64,
    /// Rolling probe failure rate in [0, 1]
    pub error_rate: f64,
    pub compression_enabled: bool,
    pub offline_mode: bool,
}

struct Monitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// =============================================================================
// Network Adaptation Manager
// =============================================================================

pub struct NetworkAdaptationManager {
    probe: ConnectivityProbeRef,
    cache: Arc<SmartCache>,
    images: OptimizedImageLoader,
    config: NetworkManagerConfig,
    tier_tx: watch::Sender<NetworkTier>,
    /// Last download speed (Kbps) and latency (ms) reported
    link: RwLock<(f64, u64)>,
    hit_rate: RollingRate,
    error_rate: RollingRate,
    compression_enabled: AtomicBool,
    offline_mode: AtomicBool,
    monitor: Mutex<Option<Monitor>>,
}

impl NetworkAdaptationManager {
    pub fn new(probe: ConnectivityProbeRef, cache: Arc<SmartCache>, images: OptimizedImageLoader) -> Self {
        Self::with_config(probe, cache, images, NetworkManagerConfig::default())
    }

    pub fn with_config(
        probe: ConnectivityProbeRef,
        cache: Arc<SmartCache>,
        images: OptimizedImageLoader,
        config: NetworkManagerConfig,
    ) -> Self {
        let (tier_tx, _) = watch::channel(config.initial_tier);
        Self {
            probe,
            cache,
            images,
            config,
            tier_tx,
            link: RwLock::new((1_000.0, 100)),
            hit_rate: RollingRate::new(),
            error_rate: RollingRate::new(),
            compression_enabled: AtomicBool::new(false),
            offline_mode: AtomicBool::new(false),
            monitor: Mutex::new(None),
        }
    }

    /// Current tier; never blocks
    pub fn get_network_state(&self) -> NetworkTier {
        *self.tier_tx.borrow()
    }

    /// Policy for the current tier
    pub fn get_optimization_strategy(&self) -> AdaptationPolicy {
        self.get_network_state().policy()
    }

    pub fn get_prefetch_strategy(&self) -> PrefetchStrategy {
        PrefetchStrategy::for_tier(self.get_network_state())
    }

    pub fn get_bundle_config(&self) -> BundleConfig {
        BundleConfig::for_tier(self.get_network_state())
    }

    /// Follow tier changes
    pub fn subscribe_tier(&self) -> watch::Receiver<NetworkTier> {
        self.tier_tx.subscribe()
    }

    /// The cache behind `get_cached_data` / `cache_data`
    pub fn cache(&self) -> &Arc<SmartCache> {
        &self.cache
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Sample connectivity once and apply the result
    ///
    /// A probe failure keeps the previous tier.
    pub async fn poll_once(&self) -> NetworkTier {
        match self.probe.fetch().await {
            Ok(sample) => {
                self.error_rate.observe(false);
                self.apply_sample(&sample)
            }
            Err(e) => {
                self.error_rate.observe(true);
                warn!(error = %e, "Network monitoring failed");
                self.get_network_state()
            }
        }
    }

    /// Classify a sample, publish the tier and apply tier optimizations
    pub fn apply_sample(&self, sample: &ConnectivitySample) -> NetworkTier {
        let tier = NetworkTier::classify(sample);

        {
            let mut link = self.link.write();
            if let Some(downlink) = sample.downlink_kbps {
                link.0 = downlink;
            }
            if let Some(rtt) = sample.rtt_ms {
                link.1 = rtt;
            }
        }

        let previous = self.tier_tx.send_replace(tier);
        if previous != tier {
            info!(from = %previous, to = %tier, "Network tier changed");
        } else {
            debug!(tier = %tier, "Network tier unchanged");
        }

        self.optimize_for(tier);
        tier
    }

    /// Advisory toggles consumed by request and UI layers
    fn optimize_for(&self, tier: NetworkTier) {
        let policy = tier.policy();

        let was_compressing = self
            .compression_enabled
            .swap(policy.compression, Ordering::Relaxed);
        if policy.compression && !was_compressing {
            info!(tier = %tier, "Enabling compression for slow network");
        }

        let was_offline = self.offline_mode.swap(policy.offline_mode, Ordering::Relaxed);
        if policy.offline_mode && !was_offline {
            info!("Switching to offline mode");
        } else if !policy.offline_mode && was_offline {
            info!(tier = %tier, "Leaving offline mode");
        }
    }

    pub fn is_compression_enabled(&self) -> bool {
        self.compression_enabled.load(Ordering::Relaxed)
    }

    pub fn is_offline_mode(&self) -> bool {
        self.offline_mode.load(Ordering::Relaxed)
    }

    /// Start periodic polling; a second call is a no-op
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.poll_once().await;
                    }
                }
            }
            debug!("Network monitoring stopped");
        });

        info!(interval = ?period, "Network monitoring started");
        *slot = Some(Monitor { cancel, handle });
    }

    /// Stop periodic polling; idempotent
    pub fn stop_monitoring(&self) {
        if let Some(monitor) = self.monitor.lock().take() {
            monitor.cancel.cancel();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    // =========================================================================
    // Cache Pass-Through
    // =========================================================================

    /// Cache lookup that also feeds the rolling hit rate
    pub async fn get_cached_data(&self, key: &str) -> Option<Value> {
        let data = self.cache.get(key).await;
        self.hit_rate.observe(data.is_some());
        data
    }

    pub async fn cache_data<T: Serialize + ?Sized>(&self, key: &str, data: &T, ttl: Ttl) -> Result<()> {
        self.cache.set(key, data, ttl).await
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Resolve an image at the current tier's quality unless overridden
    pub async fn load_optimized_image(&self, uri: &str, quality_override: Option<f32>) -> String {
        self.load_optimized_image_sized(uri, quality_override, None).await
    }

    pub async fn load_optimized_image_sized(
        &self,
        uri: &str,
        quality_override: Option<f32>,
        dimensions: Option<ImageDimensions>,
    ) -> String {
        let quality = quality_override.unwrap_or_else(|| self.get_optimization_strategy().image_quality);
        self.images.load_image(uri, quality, dimensions).await
    }

    pub fn image_loader(&self) -> &OptimizedImageLoader {
        &self.images
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    pub fn get_metrics(&self) -> NetworkMetrics {
        let (download_speed, latency) = *self.link.read();
        NetworkMetrics {
            network_type: self.get_network_state(),
            download_speed,
            latency,
            cache_hit_rate: self.hit_rate.get(),
            error_rate: self.error_rate.get(),
            compression_enabled: self.is_compression_enabled(),
            offline_mode: self.is_offline_mode(),
        }
    }
}

impl Drop for NetworkAdaptationManager {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.get_mut().take() {
            monitor.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use crate::domain::ports::EffectiveType;
    use crate::network::probe::StaticProbe;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn setup(sample: ConnectivitySample) -> (Arc<NetworkAdaptationManager>, Arc<StaticProbe>) {
        let probe = Arc::new(StaticProbe::new(sample));
        let cache = Arc::new(SmartCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
        ));
        let manager = Arc::new(NetworkAdaptationManager::new(
            probe.clone(),
            cache,
            OptimizedImageLoader::default(),
        ));
        (manager, probe)
    }

    #[tokio::test]
    async fn test_defaults_to_wifi_before_first_sample() {
        let (manager, probe) = setup(ConnectivitySample::offline());
        assert_eq!(manager.get_network_state(), NetworkTier::Wifi);
        assert_eq!(probe.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_applies_tier_and_toggles() {
        let (manager, probe) = setup(ConnectivitySample::offline());
        let mut tiers = manager.subscribe_tier();

        assert_eq!(manager.poll_once().await, NetworkTier::Offline);
        assert!(tiers.has_changed().unwrap());
        assert_eq!(*tiers.borrow_and_update(), NetworkTier::Offline);
        assert!(manager.is_offline_mode());
        assert!(manager.is_compression_enabled());
        assert_eq!(manager.get_optimization_strategy().retry_attempts, 0);

        probe.set(ConnectivitySample::cellular(
            Some(EffectiveType::ThreeG),
            Some(200.0),
            Some(800),
        ));
        assert_eq!(manager.poll_once().await, NetworkTier::ThreeGSlow);
        assert!(!manager.is_offline_mode());

        let metrics = manager.get_metrics();
        assert_eq!(metrics.network_type, NetworkTier::ThreeGSlow);
        assert_eq!(metrics.download_speed, 200.0);
        assert_eq!(metrics.latency, 800);
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_tier() {
        let (manager, probe) = setup(ConnectivitySample::cellular(None, Some(100.0), None));
        assert_eq!(manager.poll_once().await, NetworkTier::Edge);

        probe.set_failing(true);
        assert_eq!(manager.poll_once().await, NetworkTier::Edge);
        assert!(manager.get_metrics().error_rate > 0.0);
    }

    #[tokio::test]
    async fn test_cached_data_feeds_hit_rate() {
        let (manager, _probe) = setup(ConnectivitySample::wifi());

        manager.cache_data("k", &json!(1), Ttl::Forever).await.unwrap();
        assert_eq!(manager.get_cached_data("k").await, Some(json!(1)));
        assert_eq!(manager.get_metrics().cache_hit_rate, 0.5);

        assert_eq!(manager.get_cached_data("missing").await, None);
        assert_eq!(manager.get_metrics().cache_hit_rate, 0.25);
    }

    #[tokio::test]
    async fn test_image_quality_follows_tier() {
        let (manager, _probe) = setup(ConnectivitySample::cellular(None, Some(30.0), None));
        manager.poll_once().await;

        assert_eq!(
            manager.load_optimized_image("https://cdn/p.jpg", None).await,
            "https://cdn/p.jpg?q=0.4"
        );
        assert_eq!(
            manager.load_optimized_image("https://cdn/p.jpg", Some(0.9)).await,
            "https://cdn/p.jpg?q=0.9"
        );
        assert_eq!(manager.image_loader().cache_size(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_lifecycle() {
        let (manager, probe) = setup(ConnectivitySample::offline());

        manager.start_monitoring();
        manager.start_monitoring();
        assert!(manager.is_monitoring());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(probe.fetch_count(), 3);
        assert_eq!(manager.get_network_state(), NetworkTier::Offline);

        manager.stop_monitoring();
        manager.stop_monitoring();
        assert!(!manager.is_monitoring());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(probe.fetch_count(), 3);
    }
}
