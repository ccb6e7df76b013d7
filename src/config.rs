//! Engine configuration
//!
//! Every field has a default, so an empty YAML document (or no file at
//! all) yields a working setup. Durations are spelled out with their unit
//! in the field name.
//!
//! ```yaml
//! data_dir: /var/lib/thimar
//! cache:
//!   capacity: 100
//!   sweep_interval_secs: 3600
//! network:
//!   poll_interval_secs: 5
//!   probe_target: 1.1.1.1:443
//! sync:
//!   auto_sync_interval_secs: 30
//!   max_retries: 3
//! ```

use crate::cache::{SmartCacheConfig, Ttl};
use crate::error::{Error, Result};
use crate::network::{NetworkManagerConfig, TcpProbeConfig};
use crate::offline::OfflineManagerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Directory of the file-backed durable store
    pub data_dir: PathBuf,
    pub cache: CacheSection,
    pub network: NetworkSection,
    pub sync: SyncSection,
    pub data: DataSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub capacity: usize,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    pub poll_interval_secs: u64,
    /// `host:port` the TCP probe connects to
    pub probe_target: String,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub auto_sync_interval_secs: u64,
    pub completed_hold_ms: u64,
    pub max_retries: u32,
    pub retry_initial_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub staleness_window_days: u64,
    pub products_ttl_hours: u64,
    pub categories_ttl_days: u64,
    pub search_history_limit: usize,
    pub app_version: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".thimar"),
            cache: CacheSection::default(),
            network: NetworkSection::default(),
            sync: SyncSection::default(),
            data: DataSection::default(),
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: 100,
            sweep_interval_secs: 3600,
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            probe_target: "1.1.1.1:443".to_string(),
            probe_timeout_secs: 5,
        }
    }
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            auto_sync_interval_secs: 30,
            completed_hold_ms: 2000,
            max_retries: 3,
            retry_initial_backoff_ms: 250,
        }
    }
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            staleness_window_days: 7,
            products_ttl_hours: 24,
            categories_ttl_days: 7,
            search_history_limit: 20,
            app_version: "3.0.0".to_string(),
        }
    }
}

impl OfflineConfig {
    /// Load from `path`, or defaults when no path is given
    ///
    /// A path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(Error::Configuration("cache.capacity must be positive".into()));
        }
        if self.network.poll_interval_secs == 0 || self.sync.auto_sync_interval_secs == 0 {
            return Err(Error::Configuration("intervals must be positive".into()));
        }
        if self.network.probe_target.trim().is_empty() {
            return Err(Error::Configuration("network.probe_target is empty".into()));
        }
        Ok(())
    }

    pub fn smart_cache(&self) -> SmartCacheConfig {
        SmartCacheConfig {
            capacity: self.cache.capacity,
            sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs),
            ..Default::default()
        }
    }

    pub fn network_manager(&self) -> NetworkManagerConfig {
        NetworkManagerConfig {
            poll_interval: Duration::from_secs(self.network.poll_interval_secs),
            ..Default::default()
        }
    }

    pub fn tcp_probe(&self) -> TcpProbeConfig {
        TcpProbeConfig {
            target: self.network.probe_target.clone(),
            connect_timeout: Duration::from_secs(self.network.probe_timeout_secs),
        }
    }

    pub fn offline_manager(&self) -> OfflineManagerConfig {
        OfflineManagerConfig {
            auto_sync_interval: Duration::from_secs(self.sync.auto_sync_interval_secs),
            completed_hold: Duration::from_millis(self.sync.completed_hold_ms),
            max_retries: self.sync.max_retries,
            staleness_window: Duration::from_secs(self.data.staleness_window_days * 24 * 60 * 60),
            products_ttl: Ttl::hours(self.data.products_ttl_hours),
            categories_ttl: Ttl::days(self.data.categories_ttl_days),
            search_history_limit: self.data.search_history_limit,
            data_version: self.data.app_version.clone(),
            retry_initial_backoff: Duration::from_millis(self.sync.retry_initial_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let config = OfflineConfig::default();
        let manager = config.offline_manager();
        let expected = OfflineManagerConfig::default();

        assert_eq!(manager.auto_sync_interval, expected.auto_sync_interval);
        assert_eq!(manager.completed_hold, expected.completed_hold);
        assert_eq!(manager.staleness_window, expected.staleness_window);
        assert_eq!(manager.products_ttl, expected.products_ttl);
        assert_eq!(manager.categories_ttl, expected.categories_ttl);
        assert_eq!(manager.data_version, expected.data_version);
        assert_eq!(config.smart_cache().capacity, SmartCacheConfig::default().capacity);
    }

    #[test]
    fn test_partial_yaml() {
        let config = OfflineConfig::from_yaml(
            "cache:\n  capacity: 10\nsync:\n  max_retries: 5\n",
        )
        .unwrap();
        assert_eq!(config.cache.capacity, 10);
        assert_eq!(config.cache.sweep_interval_secs, 3600);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.network.probe_target, "1.1.1.1:443");
    }

    #[test]
    fn test_load() {
        assert_eq!(OfflineConfig::load(None).unwrap(), OfflineConfig::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "data_dir: /tmp/thimar\nnetwork:\n  poll_interval_secs: 10").unwrap();
        let config = OfflineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/thimar"));
        assert_eq!(config.network_manager().poll_interval, Duration::from_secs(10));

        assert_matches!(
            OfflineConfig::load(Some(Path::new("/nonexistent/thimar.yaml"))),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_invalid() {
        assert_matches!(
            OfflineConfig::from_yaml("cache: [1, 2]"),
            Err(Error::YamlParse(_))
        );
        let mut config = OfflineConfig::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }
}
