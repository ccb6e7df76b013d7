//! Cache Entry Types
//!
//! Defines the TTL policy and the entry record shared by the smart cache
//! and the offline storage manager's durable accessors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// =============================================================================
// TTL
// =============================================================================

/// Time-to-live for a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Never expires (voice command tables, localization)
    #[default]
    Forever,
    /// Expires this long after being written
    For(Duration),
}

impl Ttl {
    pub fn hours(hours: u64) -> Self {
        Ttl::For(Duration::from_secs(hours * 60 * 60))
    }

    pub fn days(days: u64) -> Self {
        Ttl::hours(days * 24)
    }

    /// Absolute expiry for an entry written at `now_ms`
    pub fn expires_at(&self, now_ms: i64) -> Option<i64> {
        match self {
            Ttl::Forever => None,
            Ttl::For(ttl) => Some(now_ms.saturating_add(ttl.as_millis() as i64)),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(ttl: Duration) -> Self {
        Ttl::For(ttl)
    }
}

impl From<Option<Duration>> for Ttl {
    fn from(ttl: Option<Duration>) -> Self {
        ttl.map(Ttl::For).unwrap_or(Ttl::Forever)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached value with its write time and optional expiry (Unix millis)
///
/// This is also the on-disk envelope: `{"data": ..., "timestamp": ..., "expires": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value
    pub data: Value,
    /// When the entry was written
    pub timestamp: i64,
    /// When the entry stops being served (`None` = never)
    #[serde(default)]
    pub expires: Option<i64>,
}

impl CacheEntry {
    /// Create an entry written at `now_ms`
    pub fn new(data: Value, now_ms: i64, ttl: Ttl) -> Self {
        Self {
            data,
            timestamp: now_ms,
            expires: ttl.expires_at(now_ms),
        }
    }

    /// An entry is absent from `expires` onwards
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires.is_some_and(|expires| now_ms >= expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ttl_expiry() {
        assert_eq!(Ttl::Forever.expires_at(1_000), None);
        assert_eq!(Ttl::For(Duration::from_secs(1)).expires_at(1_000), Some(2_000));
        assert_eq!(Ttl::hours(24), Ttl::For(Duration::from_secs(86_400)));
        assert_eq!(Ttl::from(None), Ttl::Forever);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let entry = CacheEntry::new(json!([1, 2]), 1_000, Ttl::For(Duration::from_millis(500)));
        assert!(!entry.is_expired(1_499));
        assert!(entry.is_expired(1_500));

        let forever = CacheEntry::new(json!("x"), 0, Ttl::Forever);
        assert!(!forever.is_expired(i64::MAX));
    }

    #[test]
    fn test_envelope_format() {
        let entry = CacheEntry::new(json!({"a": 1}), 10, Ttl::For(Duration::from_millis(5)));
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"data": {"a": 1}, "timestamp": 10, "expires": 15})
        );

        // Envelopes written without an expiry field live forever
        let parsed: CacheEntry = serde_json::from_str(r#"{"data":1,"timestamp":5}"#).unwrap();
        assert_eq!(parsed.expires, None);
    }
}
