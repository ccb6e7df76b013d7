//! Performance Monitor
//!
//! Named timers with aggregate reporting. Each `end_timer` measures from
//! the matching `start_timer`; a name that was never started measures
//! from the monitor's creation.

use crate::domain::ports::ClockRef;
use chrono::{SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tracing::debug;

#[derive(Debug, Default)]
struct Timer {
    started_at: Option<i64>,
    samples: Vec<u64>,
}

/// Aggregates for one named metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub average: f64,
    pub min: u64,
    pub max: u64,
    pub count: usize,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    #[serde(flatten)]
    pub metrics: BTreeMap<String, MetricSummary>,
    /// Milliseconds since the monitor was created
    pub session_duration: u64,
    /// RFC 3339, millisecond precision
    pub timestamp: String,
}

pub struct PerformanceMonitor {
    clock: ClockRef,
    created_at: i64,
    timers: Mutex<HashMap<String, Timer>>,
}

impl PerformanceMonitor {
    pub fn new(clock: ClockRef) -> Self {
        Self {
            created_at: clock.now_ms(),
            clock,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or restart) `name`, discarding its previous samples
    pub fn start_timer(&self, name: &str) {
        let now = self.clock.now_ms();
        self.timers.lock().insert(
            name.to_string(),
            Timer {
                started_at: Some(now),
                samples: Vec::new(),
            },
        );
    }

    /// Record and return the elapsed milliseconds for `name`
    pub fn end_timer(&self, name: &str) -> u64 {
        let now = self.clock.now_ms();
        let mut timers = self.timers.lock();
        let timer = timers.entry(name.to_string()).or_default();
        let from = timer.started_at.unwrap_or(self.created_at);
        let duration = now.saturating_sub(from).max(0) as u64;
        timer.samples.push(duration);
        debug!(metric = name, duration_ms = duration, "Timer ended");
        duration
    }

    /// Time an async operation under `name`
    pub async fn measure<F, T>(&self, name: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        self.start_timer(name);
        let out = fut.await;
        self.end_timer(name);
        out
    }

    /// Mean of the recorded samples; 0 when there are none
    pub fn get_average_time(&self, name: &str) -> f64 {
        self.timers
            .lock()
            .get(name)
            .map_or(0.0, |t| average(&t.samples))
    }

    pub fn generate_report(&self) -> PerformanceReport {
        let now = self.clock.now_ms();
        let metrics = self
            .timers
            .lock()
            .iter()
            .filter(|(_, t)| !t.samples.is_empty())
            .map(|(name, t)| {
                let summary = MetricSummary {
                    average: average(&t.samples),
                    min: t.samples.iter().copied().min().unwrap_or(0),
                    max: t.samples.iter().copied().max().unwrap_or(0),
                    count: t.samples.len(),
                    total: t.samples.iter().sum(),
                };
                (name.clone(), summary)
            })
            .collect();

        let timestamp = Utc
            .timestamp_millis_opt(now)
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);

        PerformanceReport {
            metrics,
            session_duration: now.saturating_sub(self.created_at).max(0) as u64,
            timestamp,
        }
    }
}

fn average(samples: &[u64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<u64>() as f64 / samples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn monitor() -> (PerformanceMonitor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (PerformanceMonitor::new(clock.clone()), clock)
    }

    #[test]
    fn test_end_timer_measures_from_start() {
        let (monitor, clock) = monitor();
        clock.advance(Duration::from_secs(60));

        monitor.start_timer("load");
        clock.advance(Duration::from_millis(120));
        assert_eq!(monitor.end_timer("load"), 120);
        clock.advance(Duration::from_millis(30));
        assert_eq!(monitor.end_timer("load"), 150);
        assert_eq!(monitor.get_average_time("load"), 135.0);
    }

    #[test]
    fn test_unstarted_timer_measures_from_creation() {
        let (monitor, clock) = monitor();
        clock.advance(Duration::from_millis(500));
        assert_eq!(monitor.end_timer("boot"), 500);
    }

    #[test]
    fn test_start_resets_samples() {
        let (monitor, clock) = monitor();
        monitor.start_timer("a");
        clock.advance(Duration::from_millis(10));
        monitor.end_timer("a");
        monitor.start_timer("a");
        assert_eq!(monitor.get_average_time("a"), 0.0);
        assert_eq!(monitor.get_average_time("missing"), 0.0);
    }

    #[test]
    fn test_report() {
        let (monitor, clock) = monitor();
        monitor.start_timer("sync");
        clock.advance(Duration::from_millis(10));
        monitor.end_timer("sync");
        clock.advance(Duration::from_millis(30));
        monitor.end_timer("sync");
        monitor.start_timer("idle");

        let report = monitor.generate_report();
        assert_eq!(report.session_duration, 40);
        assert!(!report.metrics.contains_key("idle"));
        let sync = &report.metrics["sync"];
        assert_eq!((sync.min, sync.max, sync.count, sync.total), (10, 40, 2, 50));
        assert_eq!(sync.average, 25.0);
        assert_eq!(report.timestamp, "2023-11-14T22:13:20.040Z");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["sync"]["count"], 2);
        assert_eq!(json["sessionDuration"], 40);
    }

    #[test]
    fn test_measure() {
        let (monitor, _clock) = monitor();
        let out = tokio_test::block_on(monitor.measure("op", async { 7 }));
        assert_eq!(out, 7);
        assert_eq!(monitor.generate_report().metrics["op"].count, 1);
    }
}
