//! Network Tier Definitions
//!
//! Discrete connectivity classes, the adaptation policy attached to each,
//! and the classifier that maps a connectivity sample onto a tier.

use crate::domain::ports::{ConnectionType, ConnectivitySample, EffectiveType};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Thresholds
// =============================================================================

/// Downlink below this is slow-2g (Kbps)
pub const SLOW_2G_MAX_KBPS: f64 = 50.0;

/// Downlink below this is edge (Kbps)
pub const EDGE_MAX_KBPS: f64 = 150.0;

/// Downlink below this on a 3g link is 3g-slow (Kbps)
pub const THREE_G_SLOW_MAX_KBPS: f64 = 350.0;

/// Downlink below this is 3g; at or above is 4g (Kbps)
pub const THREE_G_MAX_KBPS: f64 = 500.0;

// =============================================================================
// Network Tier
// =============================================================================

/// Connectivity class, ordered from least to most capable
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum NetworkTier {
    #[serde(rename = "offline")]
    Offline,
    /// < 50 Kbps, > 2000 ms latency
    #[serde(rename = "slow-2g")]
    Slow2g,
    /// 50-150 Kbps, 1000-2000 ms latency
    #[serde(rename = "edge")]
    Edge,
    /// 150-350 Kbps, 500-1000 ms latency
    #[serde(rename = "3g-slow")]
    ThreeGSlow,
    /// 350-500 Kbps, 300-500 ms latency
    #[serde(rename = "3g")]
    ThreeG,
    /// > 500 Kbps, < 300 ms latency
    #[serde(rename = "4g")]
    FourG,
    /// Assumed until the first real measurement arrives
    #[default]
    #[serde(rename = "wifi")]
    Wifi,
}

impl NetworkTier {
    /// All tiers in ascending capability
    pub fn all() -> &'static [NetworkTier] {
        &[
            NetworkTier::Offline,
            NetworkTier::Slow2g,
            NetworkTier::Edge,
            NetworkTier::ThreeGSlow,
            NetworkTier::ThreeG,
            NetworkTier::FourG,
            NetworkTier::Wifi,
        ]
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, NetworkTier::Offline)
    }

    /// Numeric rank, exported as a gauge
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// The adaptation policy for this tier
    pub fn policy(&self) -> AdaptationPolicy {
        AdaptationPolicy::for_tier(*self)
    }

    /// Classify a connectivity sample
    ///
    /// A wifi link wins regardless of measured throughput. Otherwise the
    /// platform's effective type and the downlink estimate are checked in
    /// ascending order; round-trip time is the last resort.
    pub fn classify(sample: &ConnectivitySample) -> NetworkTier {
        if !sample.is_connected {
            return NetworkTier::Offline;
        }
        if sample.connection_type == ConnectionType::Wifi {
            return NetworkTier::Wifi;
        }

        let effective = sample.effective_type;
        let below = |limit: f64| sample.downlink_kbps.is_some_and(|d| d < limit);

        if effective == Some(EffectiveType::Slow2g) || below(SLOW_2G_MAX_KBPS) {
            NetworkTier::Slow2g
        } else if effective == Some(EffectiveType::TwoG) || below(EDGE_MAX_KBPS) {
            NetworkTier::Edge
        } else if effective == Some(EffectiveType::ThreeG) && below(THREE_G_SLOW_MAX_KBPS) {
            NetworkTier::ThreeGSlow
        } else if effective == Some(EffectiveType::ThreeG) || below(THREE_G_MAX_KBPS) {
            NetworkTier::ThreeG
        } else if effective == Some(EffectiveType::FourG) || sample.downlink_kbps.is_some() {
            NetworkTier::FourG
        } else {
            sample.rtt_ms.map(Self::from_rtt).unwrap_or(NetworkTier::FourG)
        }
    }

    /// Tier implied by round-trip time alone
    fn from_rtt(rtt_ms: u64) -> NetworkTier {
        match rtt_ms {
            r if r > 2000 => NetworkTier::Slow2g,
            r if r > 1000 => NetworkTier::Edge,
            r if r > 500 => NetworkTier::ThreeGSlow,
            r if r > 300 => NetworkTier::ThreeG,
            _ => NetworkTier::FourG,
        }
    }
}

impl fmt::Display for NetworkTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkTier::Offline => write!(f, "offline"),
            NetworkTier::Slow2g => write!(f, "slow-2g"),
            NetworkTier::Edge => write!(f, "edge"),
            NetworkTier::ThreeGSlow => write!(f, "3g-slow"),
            NetworkTier::ThreeG => write!(f, "3g"),
            NetworkTier::FourG => write!(f, "4g"),
            NetworkTier::Wifi => write!(f, "wifi"),
        }
    }
}

// =============================================================================
// Adaptation Policy
// =============================================================================

/// Behavior knobs for one network tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationPolicy {
    /// Image quality in (0, 1]
    pub image_quality: f32,
    pub lazy_loading: bool,
    pub prefetch: bool,
    pub compression: bool,
    pub batch_requests: bool,
    /// Extra attempts per sync call within one pass
    pub retry_attempts: u32,
    /// Per-attempt timeout (0 = no network at all)
    pub timeout_ms: u64,
    pub offline_mode: bool,
}

impl AdaptationPolicy {
    /// Policy table lookup
    pub const fn for_tier(tier: NetworkTier) -> Self {
        match tier {
            NetworkTier::Offline => Self::row(0.3, false, false, true, false, 0, 0, true),
            NetworkTier::Slow2g => Self::row(0.4, true, false, true, true, 1, 15_000, false),
            NetworkTier::Edge => Self::row(0.5, true, false, true, true, 2, 10_000, false),
            NetworkTier::ThreeGSlow => Self::row(0.6, true, false, true, true, 3, 8_000, false),
            NetworkTier::ThreeG => Self::row(0.7, true, true, true, false, 3, 5_000, false),
            NetworkTier::FourG => Self::row(0.8, false, true, false, false, 3, 3_000, false),
            NetworkTier::Wifi => Self::row(0.9, false, true, false, false, 3, 2_000, false),
        }
    }

    #[allow(clippy::too_many_arguments)]
    const fn row(
        image_quality: f32,
        lazy_loading: bool,
        prefetch: bool,
        compression: bool,
        batch_requests: bool,
        retry_attempts: u32,
        timeout_ms: u64,
        offline_mode: bool,
    ) -> Self {
        Self {
            image_quality,
            lazy_loading,
            prefetch,
            compression,
            batch_requests,
            retry_attempts,
            timeout_ms,
            offline_mode,
        }
    }

    /// Per-attempt timeout, `None` when the tier forbids network calls
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_ms > 0).then(|| std::time::Duration::from_millis(self.timeout_ms))
    }
}

// =============================================================================
// Derived Strategies
// =============================================================================

/// Relative priority of prefetch requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrefetchPriority {
    High,
    Low,
}

/// How aggressively to prefetch on the current tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefetchStrategy {
    pub enabled: bool,
    pub priority: PrefetchPriority,
    pub batch_size: u32,
    pub max_concurrent: u32,
}

impl PrefetchStrategy {
    pub fn for_tier(tier: NetworkTier) -> Self {
        let policy = tier.policy();
        Self {
            enabled: policy.prefetch,
            priority: if tier == NetworkTier::Wifi {
                PrefetchPriority::High
            } else {
                PrefetchPriority::Low
            },
            batch_size: if policy.batch_requests { 3 } else { 10 },
            max_concurrent: if tier.is_offline() { 0 } else { 3 },
        }
    }
}

/// Asset delivery options for the current tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
    pub code_splitting: bool,
    pub lazy_loading: bool,
    pub tree_shaking: bool,
    pub minification: bool,
    pub compression: bool,
    /// Load only the Arabic glyph subset
    pub font_subsetting: bool,
    pub image_optimization: bool,
}

impl BundleConfig {
    pub fn for_tier(tier: NetworkTier) -> Self {
        let constrained = tier != NetworkTier::Wifi;
        Self {
            code_splitting: constrained,
            lazy_loading: constrained,
            tree_shaking: true,
            minification: true,
            compression: constrained,
            font_subsetting: true,
            image_optimization: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cellular(effective: Option<EffectiveType>, downlink: Option<f64>) -> ConnectivitySample {
        ConnectivitySample::cellular(effective, downlink, None)
    }

    #[test]
    fn test_offline_and_wifi_override() {
        assert_eq!(NetworkTier::classify(&ConnectivitySample::offline()), NetworkTier::Offline);

        let mut slow_wifi = ConnectivitySample::wifi();
        slow_wifi.downlink_kbps = Some(10.0);
        slow_wifi.effective_type = Some(EffectiveType::Slow2g);
        assert_eq!(NetworkTier::classify(&slow_wifi), NetworkTier::Wifi);
    }

    #[test]
    fn test_downlink_thresholds() {
        let cases = [
            (30.0, NetworkTier::Slow2g),
            (100.0, NetworkTier::Edge),
            (400.0, NetworkTier::ThreeG),
            (500.0, NetworkTier::FourG),
            (5_000.0, NetworkTier::FourG),
        ];
        for (downlink, expected) in cases {
            assert_eq!(
                NetworkTier::classify(&cellular(None, Some(downlink))),
                expected,
                "downlink {downlink}"
            );
        }
    }

    #[test]
    fn test_effective_type_classification() {
        assert_eq!(
            NetworkTier::classify(&cellular(Some(EffectiveType::ThreeG), Some(200.0))),
            NetworkTier::ThreeGSlow
        );
        assert_eq!(
            NetworkTier::classify(&cellular(Some(EffectiveType::ThreeG), Some(2_000.0))),
            NetworkTier::ThreeG
        );
        assert_eq!(
            NetworkTier::classify(&cellular(Some(EffectiveType::TwoG), Some(2_000.0))),
            NetworkTier::Edge
        );
        assert_eq!(
            NetworkTier::classify(&cellular(Some(EffectiveType::FourG), None)),
            NetworkTier::FourG
        );
    }

    #[test]
    fn test_rtt_fallback() {
        let sample = ConnectivitySample::cellular(None, None, Some(1_500));
        assert_eq!(NetworkTier::classify(&sample), NetworkTier::Edge);

        let sample = ConnectivitySample::cellular(None, None, None);
        assert_eq!(NetworkTier::classify(&sample), NetworkTier::FourG);
    }

    #[test]
    fn test_offline_policy_invariant() {
        let policy = NetworkTier::Offline.policy();
        assert!(policy.offline_mode);
        assert_eq!(policy.retry_attempts, 0);
        assert!(!policy.prefetch);
        assert_eq!(policy.timeout(), None);

        for tier in NetworkTier::all() {
            let q = tier.policy().image_quality;
            assert!(q > 0.0 && q <= 1.0);
            assert_eq!(tier.policy().offline_mode, tier.is_offline());
        }
    }

    #[test]
    fn test_tier_ordering_and_display() {
        assert!(NetworkTier::Offline < NetworkTier::Slow2g);
        assert!(NetworkTier::ThreeGSlow < NetworkTier::ThreeG);
        assert!(NetworkTier::FourG < NetworkTier::Wifi);
        assert_eq!(NetworkTier::ThreeGSlow.to_string(), "3g-slow");
        assert_eq!(
            serde_json::to_string(&NetworkTier::Slow2g).unwrap(),
            "\"slow-2g\""
        );
        assert_eq!(NetworkTier::default(), NetworkTier::Wifi);
    }

    #[test]
    fn test_derived_strategies() {
        let wifi = PrefetchStrategy::for_tier(NetworkTier::Wifi);
        assert!(wifi.enabled);
        assert_eq!(wifi.priority, PrefetchPriority::High);
        assert_eq!(wifi.batch_size, 10);
        assert_eq!(wifi.max_concurrent, 3);

        let edge = PrefetchStrategy::for_tier(NetworkTier::Edge);
        assert!(!edge.enabled);
        assert_eq!(edge.priority, PrefetchPriority::Low);
        assert_eq!(edge.batch_size, 3);

        assert_eq!(PrefetchStrategy::for_tier(NetworkTier::Offline).max_concurrent, 0);

        assert!(!BundleConfig::for_tier(NetworkTier::Wifi).code_splitting);
        assert!(BundleConfig::for_tier(NetworkTier::ThreeG).compression);
    }
}
