//! Connectivity Probe Adapters
//!
//! - [`StaticProbe`]: returns a settable sample (tests, pinned tiers)
//! - [`TcpProbe`]: measures TCP connect time to a reference host

use crate::domain::ports::{ConnectionType, ConnectivityProbe, ConnectivitySample, EffectiveType};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;

// =============================================================================
// Static Probe
// =============================================================================

/// Probe that reports whatever sample it was last given
pub struct StaticProbe {
    sample: RwLock<ConnectivitySample>,
    failing: AtomicBool,
    fetches: AtomicU64,
}

impl StaticProbe {
    pub fn new(sample: ConnectivitySample) -> Self {
        Self {
            sample: RwLock::new(sample),
            failing: AtomicBool::new(false),
            fetches: AtomicU64::new(0),
        }
    }

    /// Replace the reported sample
    pub fn set(&self, sample: ConnectivitySample) {
        *self.sample.write() = sample;
    }

    /// Make every fetch fail (for testing probe errors)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of fetches served
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self::new(ConnectivitySample::wifi())
    }
}

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn fetch(&self) -> Result<ConnectivitySample> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::ProbeFailed("static probe set to fail".to_string()));
        }
        Ok(self.sample.read().clone())
    }
}

// =============================================================================
// TCP Probe
// =============================================================================

/// Configuration for the TCP probe
#[derive(Debug, Clone)]
pub struct TcpProbeConfig {
    /// `host:port` to connect to
    pub target: String,
    /// Give up and report offline after this long
    pub connect_timeout: Duration,
}

impl Default for TcpProbeConfig {
    fn default() -> Self {
        Self {
            target: "1.1.1.1:443".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Probe that times a TCP handshake to a reference host
///
/// A failed or timed-out connect is reported as offline. Only the
/// round-trip time is measured; downlink stays unknown.
pub struct TcpProbe {
    config: TcpProbeConfig,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_config(TcpProbeConfig {
            target: target.into(),
            ..Default::default()
        })
    }

    pub fn with_config(config: TcpProbeConfig) -> Self {
        Self { config }
    }

    /// Effective type implied by a handshake round-trip
    pub fn effective_type_for_rtt(rtt_ms: u64) -> EffectiveType {
        match rtt_ms {
            r if r > 2000 => EffectiveType::Slow2g,
            r if r > 1000 => EffectiveType::TwoG,
            r if r > 300 => EffectiveType::ThreeG,
            _ => EffectiveType::FourG,
        }
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::with_config(TcpProbeConfig::default())
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn fetch(&self) -> Result<ConnectivitySample> {
        if self.config.target.trim().is_empty() {
            return Err(Error::Configuration("TCP probe target is empty".to_string()));
        }

        let started = Instant::now();
        let connect = TcpStream::connect(self.config.target.as_str());

        match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(_stream)) => {
                let rtt_ms = started.elapsed().as_millis() as u64;
                debug!(target = %self.config.target, rtt_ms, "TCP probe connected");
                Ok(ConnectivitySample {
                    is_connected: true,
                    connection_type: ConnectionType::Unknown,
                    effective_type: Some(Self::effective_type_for_rtt(rtt_ms)),
                    downlink_kbps: None,
                    rtt_ms: Some(rtt_ms),
                })
            }
            Ok(Err(e)) => {
                debug!(target = %self.config.target, error = %e, "TCP probe failed to connect");
                Ok(ConnectivitySample::offline())
            }
            Err(_) => {
                debug!(target = %self.config.target, "TCP probe timed out");
                Ok(ConnectivitySample::offline())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_static_probe() {
        let probe = StaticProbe::default();
        assert_eq!(probe.fetch().await.unwrap(), ConnectivitySample::wifi());

        probe.set(ConnectivitySample::offline());
        assert!(!probe.fetch().await.unwrap().is_connected);

        probe.set_failing(true);
        assert!(matches!(probe.fetch().await, Err(Error::ProbeFailed(_))));
        assert_eq!(probe.fetch_count(), 3);
    }

    #[test]
    fn test_rtt_bands() {
        assert_eq!(TcpProbe::effective_type_for_rtt(2_500), EffectiveType::Slow2g);
        assert_eq!(TcpProbe::effective_type_for_rtt(1_500), EffectiveType::TwoG);
        assert_eq!(TcpProbe::effective_type_for_rtt(400), EffectiveType::ThreeG);
        assert_eq!(TcpProbe::effective_type_for_rtt(300), EffectiveType::FourG);
    }

    #[tokio::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let sample = TcpProbe::new(addr.to_string()).fetch().await.unwrap();
        assert!(sample.is_connected);
        assert_eq!(sample.effective_type, Some(EffectiveType::FourG));
    }

    #[tokio::test]
    async fn test_tcp_probe_refused_is_offline() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let sample = TcpProbe::new(addr.to_string()).fetch().await.unwrap();
        assert!(!sample.is_connected);
    }

    #[tokio::test]
    async fn test_empty_target_is_configuration_error() {
        let result = TcpProbe::new("").fetch().await;
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
