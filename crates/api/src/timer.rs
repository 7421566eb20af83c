//! Startup profiling.
//!
//! Each phase of server startup is recorded with the time spent since the
//! previous record. Nested phases use `category/name` keys and are left out
//! of the one-line summary.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;

/// Phases shorter than this are left out of the summary.
const SUMMARY_THRESHOLD: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Inner {
    start: Instant,
    last: Instant,
    records: IndexMap<String, Duration>,
}

impl Inner {
    fn fresh() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
            records: IndexMap::new(),
        }
    }
}

/// Accumulates per-phase startup durations.
#[derive(Debug)]
pub struct StartupTimer {
    inner: Mutex<Inner>,
}

/// JSON shape served at `/internal/profile-startup`.
#[derive(Debug, Serialize)]
pub struct StartupProfile {
    pub total: f64,
    pub records: IndexMap<String, f64>,
}

impl Default for StartupTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupTimer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::fresh()),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Charge the time since the previous record to `name`.
    pub fn record(&self, name: &str) {
        self.with(|inner| {
            let now = Instant::now();
            let elapsed = now - inner.last;
            inner.last = now;
            *inner.records.entry(name.to_string()).or_default() += elapsed;
        });
    }

    /// Charge the time since the previous record to `category/name`.
    pub fn subcategory(&self, category: &str, name: &str) {
        self.record(&format!("{category}/{name}"));
    }

    /// `12.3s (load options: 0.2s, build app: 1.1s)`
    pub fn summary(&self) -> String {
        self.with(|inner| {
            let total = inner.start.elapsed();
            let parts: Vec<String> = inner
                .records
                .iter()
                .filter(|(name, took)| !name.contains('/') && **took >= SUMMARY_THRESHOLD)
                .map(|(name, took)| format!("{name}: {:.1}s", took.as_secs_f64()))
                .collect();

            if parts.is_empty() {
                format!("{:.1}s", total.as_secs_f64())
            } else {
                format!("{:.1}s ({})", total.as_secs_f64(), parts.join(", "))
            }
        })
    }

    pub fn dump(&self) -> StartupProfile {
        self.with(|inner| StartupProfile {
            total: inner.start.elapsed().as_secs_f64(),
            records: inner
                .records
                .iter()
                .map(|(name, took)| (name.clone(), took.as_secs_f64()))
                .collect(),
        })
    }

    /// Forget all records and restart the clock.
    pub fn reset(&self) {
        self.with(|inner| *inner = Inner::fresh());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_skips_short_and_nested_records() {
        let timer = StartupTimer::new();
        timer.with(|inner| {
            inner
                .records
                .insert("load options".to_string(), Duration::from_millis(250));
            inner
                .records
                .insert("callbacks".to_string(), Duration::from_millis(20));
            inner
                .records
                .insert("callbacks/ext".to_string(), Duration::from_millis(900));
        });

        let summary = timer.summary();
        assert!(summary.contains("(load options: 0.2s)") || summary.contains("(load options: 0.3s)"));
        assert!(!summary.contains("callbacks"));
    }

    #[test]
    fn records_accumulate_and_reset() {
        let timer = StartupTimer::new();
        timer.record("a");
        timer.record("a");
        timer.subcategory("cb", "x");

        let profile = timer.dump();
        assert_eq!(profile.records.len(), 2);
        assert!(profile.records.contains_key("cb/x"));

        timer.reset();
        assert!(timer.dump().records.is_empty());
    }

    #[test]
    fn summary_without_records_is_total_only() {
        let timer = StartupTimer::new();
        assert!(!timer.summary().contains('('));
    }
}
