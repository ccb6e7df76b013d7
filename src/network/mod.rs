//! Network Adaptation
//!
//! Connectivity classification and tier-driven behavior:
//! - [`tier`]: `NetworkTier`, the per-tier `AdaptationPolicy` table and classifier
//! - [`probe`]: connectivity probe adapters
//! - [`image`]: de-duplicating, caching image variant loader
//! - [`manager`]: polling loop, tier publication and cache pass-through

pub mod image;
pub mod manager;
pub mod probe;
pub mod tier;

pub use image::{OptimizedImageLoader, QueryParamTransformer, DEFAULT_IMAGE_QUALITY};
pub use manager::{NetworkAdaptationManager, NetworkManagerConfig, NetworkMetrics};
pub use probe::{StaticProbe, TcpProbe, TcpProbeConfig};
pub use tier::{AdaptationPolicy, BundleConfig, NetworkTier, PrefetchPriority, PrefetchStrategy};
