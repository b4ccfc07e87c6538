//! Observability: per-request ids, latency windows and cache counters.
//! `MetricsRegistry::snapshot` is what callers read; everything else feeds it.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// Samples kept per timing metric.
const WINDOW: usize = 1024;

/// Identifiers attached to every translate request.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub trace_id: String,
    pub request_id: String,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures one timed section; recorded into the registry on `finish`.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// Record the elapsed time in microseconds and return it.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Sliding window over the most recent samples.
struct Window {
    samples: VecDeque<f64>,
}

impl Window {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(WINDOW),
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Nearest-rank percentile over the window, `p` in 0..=100.
    fn summarize(&self) -> TimingSummary {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = |p: f64| -> f64 {
            if sorted.is_empty() {
                return 0.0;
            }
            let idx = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
            sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
        };
        TimingSummary {
            p50_us: rank(50.0),
            p95_us: rank(95.0),
            p99_us: rank(99.0),
            count: sorted.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

/// Point-in-time view of every timing and counter, sorted by name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub timings: BTreeMap<String, TimingSummary>,
    pub counters: BTreeMap<String, u64>,
}

#[derive(Default)]
pub struct MetricsRegistry {
    timings: Mutex<HashMap<&'static str, Window>>,
    counters: Mutex<HashMap<&'static str, u64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a duration sample (microseconds).
    pub fn record(&self, name: &'static str, value_us: f64) {
        self.timings
            .lock()
            .entry(name)
            .or_insert_with(Window::new)
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric_recorded");
    }

    pub fn incr(&self, name: &'static str, by: u64) {
        if by == 0 {
            return;
        }
        *self.counters.lock().entry(name).or_insert(0) += by;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let timings = self
            .timings
            .lock()
            .iter()
            .map(|(&name, window)| (name.to_string(), window.summarize()))
            .collect();
        let counters = self
            .counters
            .lock()
            .iter()
            .map(|(&name, &value)| (name.to_string(), value))
            .collect();
        MetricsSnapshot { timings, counters }
    }
}

/// Well-known metric names.
pub mod metric_names {
    pub const CACHE_LOOKUP: &str = "t_cache_lookup";
    pub const CACHE_STORE: &str = "t_cache_store";
    pub const CACHE_STATS: &str = "t_cache_stats";
    pub const TRANSLATE_DONE: &str = "t_translate_done";

    pub const MEMORY_HITS: &str = "memory_hits";
    pub const STORAGE_HITS: &str = "storage_hits";
    pub const MISSES: &str = "cache_misses";
    pub const EXPIRED: &str = "expired_removed";
    pub const EVICTIONS: &str = "evictions";
    pub const STORE_FAILURES: &str = "store_failures";
}
