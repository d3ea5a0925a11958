use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// Request totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestCounts {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// Latency aggregate for a named operation, durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub total: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl LatencyStats {
    fn first(duration: f64) -> Self {
        Self {
            count: 1,
            total: duration,
            avg: duration,
            min: duration,
            max: duration,
        }
    }

    fn record(&mut self, duration: f64) {
        self.count += 1;
        self.total += duration;
        self.avg = self.total / self.count as f64;
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
    }
}

/// Execution aggregate for a named pipeline node, durations in seconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStats {
    pub count: u64,
    pub success: u64,
    pub failure: u64,
    pub total_duration: f64,
    pub avg_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
}

impl NodeStats {
    fn first(duration: f64, success: bool) -> Self {
        Self {
            count: 1,
            success: success as u64,
            failure: !success as u64,
            total_duration: duration,
            avg_duration: duration,
            min_duration: duration,
            max_duration: duration,
        }
    }

    fn record(&mut self, duration: f64, success: bool) {
        self.count += 1;
        if success {
            self.success += 1;
        } else {
            self.failure += 1;
        }
        self.total_duration += duration;
        self.avg_duration = self.total_duration / self.count as f64;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
    }
}

/// Cache hit/miss counts with the derived hit rate
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheCounts {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Snapshot of every aggregate at a point in time, in the telemetry export shape
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub requests: RequestCounts,
    pub success_rate: f64,
    pub nodes: BTreeMap<String, NodeStats>,
    pub latency: BTreeMap<String, LatencyStats>,
    pub errors: BTreeMap<String, u64>,
    pub cache: CacheCounts,
}

#[derive(Debug)]
struct MetricsState {
    requests: RequestCounts,
    nodes: HashMap<String, NodeStats>,
    latency: HashMap<String, LatencyStats>,
    errors: HashMap<String, u64>,
    cache_hits: u64,
    cache_misses: u64,
    started_at: Instant,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            requests: RequestCounts::default(),
            nodes: HashMap::new(),
            latency: HashMap::new(),
            errors: HashMap::new(),
            cache_hits: 0,
            cache_misses: 0,
            started_at: Instant::now(),
        }
    }
}

/// Thread-safe collector for request, latency, node, error and cache metrics.
///
/// One instance is built by the composition root and shared by handle; every
/// update and every snapshot goes through a single lock, so a snapshot never
/// observes half of an update.
#[derive(Debug)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        info!("Metrics collector initialized");
        Self {
            state: Mutex::new(MetricsState::new()),
        }
    }

    pub fn increment_request(&self, success: bool) {
        let mut state = self.state.lock();
        state.requests.total += 1;
        if success {
            state.requests.success += 1;
        } else {
            state.requests.failure += 1;
        }
    }

    pub fn record_node_execution(&self, node_name: &str, duration: Duration, success: bool) {
        let duration = duration.as_secs_f64();
        let mut state = self.state.lock();
        match state.nodes.get_mut(node_name) {
            Some(stats) => stats.record(duration, success),
            None => {
                state
                    .nodes
                    .insert(node_name.to_string(), NodeStats::first(duration, success));
            }
        }
    }

    pub fn record_latency(&self, operation: &str, duration: Duration) {
        let duration = duration.as_secs_f64();
        let mut state = self.state.lock();
        match state.latency.get_mut(operation) {
            Some(stats) => stats.record(duration),
            None => {
                state
                    .latency
                    .insert(operation.to_string(), LatencyStats::first(duration));
            }
        }
    }

    pub fn record_error(&self, category: &str) {
        let mut state = self.state.lock();
        *state.errors.entry(category.to_string()).or_insert(0) += 1;
    }

    pub fn record_cache_hit(&self, hit: bool) {
        let mut state = self.state.lock();
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
    }

    /// Get metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let state = self.state.lock();

        let total = state.requests.total;
        let success_rate = if total > 0 {
            state.requests.success as f64 / total as f64
        } else {
            0.0
        };

        let lookups = state.cache_hits + state.cache_misses;
        let hit_rate = if lookups > 0 {
            state.cache_hits as f64 / lookups as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: state.started_at.elapsed().as_secs_f64(),
            requests: state.requests.clone(),
            success_rate,
            nodes: state
                .nodes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            latency: state
                .latency
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            errors: state
                .errors
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            cache: CacheCounts {
                hits: state.cache_hits,
                misses: state.cache_misses,
                hit_rate,
            },
        }
    }

    /// Reset all metrics and the uptime clock
    pub fn reset(&self) {
        *self.state.lock() = MetricsState::new();
        info!("Metrics reset");
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
