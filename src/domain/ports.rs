//! Domain Ports - Core trait definitions for the offline engine
//!
//! These traits define the boundaries between the offline/caching logic and
//! the systems it runs against: the device's durable key-value store, the
//! platform connectivity probe, the (unspecified) sync backend, the image
//! pipeline and the wall clock. Adapters implement these traits to provide
//! concrete functionality.

use crate::error::Result;
use crate::offline::action::PendingAction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Durable Store Port
// =============================================================================

/// Port for the device-local durable key-value store
///
/// Values are opaque strings; callers JSON-serialize before writing. The
/// store offers no transactional guarantee beyond last-write-wins on a
/// single key.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the raw value stored under `key`
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove several keys
    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove_item(key).await?;
        }
        Ok(())
    }

    /// List every key currently held by the store
    async fn keys(&self) -> Result<Vec<String>>;

    /// Get store name (for logs and errors)
    fn store_name(&self) -> &str;
}

// =============================================================================
// Connectivity Probe Port
// =============================================================================

/// Physical link type reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Wifi,
    Cellular,
    Ethernet,
    None,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionType::Wifi => write!(f, "wifi"),
            ConnectionType::Cellular => write!(f, "cellular"),
            ConnectionType::Ethernet => write!(f, "ethernet"),
            ConnectionType::None => write!(f, "none"),
            ConnectionType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Effective connection type as estimated by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectiveType {
    #[serde(rename = "slow-2g")]
    Slow2g,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "4g")]
    FourG,
}

impl std::fmt::Display for EffectiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectiveType::Slow2g => write!(f, "slow-2g"),
            EffectiveType::TwoG => write!(f, "2g"),
            EffectiveType::ThreeG => write!(f, "3g"),
            EffectiveType::FourG => write!(f, "4g"),
        }
    }
}

/// A single connectivity measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivitySample {
    /// Whether any network is reachable
    pub is_connected: bool,
    /// Link type
    pub connection_type: ConnectionType,
    /// Platform estimate of the connection class
    pub effective_type: Option<EffectiveType>,
    /// Estimated downlink in Kbps
    pub downlink_kbps: Option<f64>,
    /// Estimated round-trip time in milliseconds
    pub rtt_ms: Option<u64>,
}

impl ConnectivitySample {
    /// Sample describing a device with no connectivity
    pub fn offline() -> Self {
        Self {
            is_connected: false,
            connection_type: ConnectionType::None,
            effective_type: None,
            downlink_kbps: None,
            rtt_ms: None,
        }
    }

    /// Sample describing a wifi link
    pub fn wifi() -> Self {
        Self {
            is_connected: true,
            connection_type: ConnectionType::Wifi,
            effective_type: Some(EffectiveType::FourG),
            downlink_kbps: Some(10_000.0),
            rtt_ms: Some(50),
        }
    }

    /// Sample describing a cellular link with the given measurements
    pub fn cellular(effective_type: Option<EffectiveType>, downlink_kbps: Option<f64>, rtt_ms: Option<u64>) -> Self {
        Self {
            is_connected: true,
            connection_type: ConnectionType::Cellular,
            effective_type,
            downlink_kbps,
            rtt_ms,
        }
    }
}

/// Port for sampling the current connectivity
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Take a fresh connectivity sample
    async fn fetch(&self) -> Result<ConnectivitySample>;
}

// =============================================================================
// Sync Endpoint Port
// =============================================================================

/// Port for the remote synchronization endpoint
///
/// One call per pending action. Implementations must be idempotent under
/// retry: the same action may be delivered more than once.
#[async_trait]
pub trait SyncEndpoint: Send + Sync {
    /// Deliver a single pending action
    async fn execute(&self, action: &PendingAction) -> Result<()>;
}

// =============================================================================
// Image Transformer Port
// =============================================================================

/// Requested output size for an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Thumbnail size used by product cards
    pub fn thumbnail() -> Self {
        Self::new(150, 150)
    }
}

/// Port for the image pipeline that produces a quality-adjusted URI
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    /// Produce the URI for `uri` at `quality` (0, 1] and optional size
    async fn transform(
        &self,
        uri: &str,
        quality: f32,
        dimensions: Option<ImageDimensions>,
    ) -> Result<String>;
}

// =============================================================================
// Clock Port
// =============================================================================

/// Source of wall-clock time in Unix milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type DurableStoreRef = Arc<dyn DurableStore>;
pub type ConnectivityProbeRef = Arc<dyn ConnectivityProbe>;
pub type SyncEndpointRef = Arc<dyn SyncEndpoint>;
pub type ImageTransformerRef = Arc<dyn ImageTransformer>;
pub type ClockRef = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_type_display() {
        assert_eq!(format!("{}", ConnectionType::Wifi), "wifi");
        assert_eq!(format!("{}", ConnectionType::Cellular), "cellular");
        assert_eq!(format!("{}", ConnectionType::None), "none");
    }

    #[test]
    fn test_effective_type_serde() {
        let json = serde_json::to_string(&EffectiveType::Slow2g).unwrap();
        assert_eq!(json, "\"slow-2g\"");
        let parsed: EffectiveType = serde_json::from_str("\"3g\"").unwrap();
        assert_eq!(parsed, EffectiveType::ThreeG);
    }

    #[test]
    fn test_sample_constructors() {
        assert!(!ConnectivitySample::offline().is_connected);
        assert_eq!(ConnectivitySample::wifi().connection_type, ConnectionType::Wifi);
        assert_eq!(ImageDimensions::thumbnail(), ImageDimensions::new(150, 150));
    }
}
