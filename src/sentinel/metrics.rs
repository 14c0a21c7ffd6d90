//! In-process metrics for the sentinel.
//!
//! Named counters and gauges behind an async lock. There is no exporter; callers
//! read a [`MetricsSnapshot`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

pub const CYCLES_COMPLETED: &str = "cycles_completed";
pub const CYCLES_SKIPPED: &str = "cycles_skipped";
pub const CHAIN_FETCH_FAILURES: &str = "chain_fetch_failures";
pub const TRANSACTIONS_SCANNED: &str = "transactions_scanned";
pub const TRANSACTIONS_FLAGGED: &str = "transactions_flagged";
pub const LOOKUPS_FAILED: &str = "lookups_failed";
pub const INPUTS_RECORDED: &str = "inputs_recorded";
pub const INPUTS_UNRECOGNIZED: &str = "inputs_unrecognized";
pub const PEGGED_VALUE: &str = "pegged_value";
pub const CYCLE_DURATION_SECONDS: &str = "cycle_duration_seconds";

#[derive(Debug, Default)]
struct InternalMetrics {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
}

/// Shared metrics registry.
#[derive(Debug, Clone, Default)]
pub struct SentinelMetrics {
    metrics: Arc<RwLock<InternalMetrics>>,
}

impl SentinelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn increment_counter(&self, name: &str) {
        self.add_to_counter(name, 1).await;
    }

    pub async fn add_to_counter(&self, name: &str, amount: u64) {
        let mut metrics = self.metrics.write().await;
        *metrics.counters.entry(name.to_string()).or_insert(0) += amount;
    }

    pub async fn set_gauge(&self, name: &str, value: f64) {
        let mut metrics = self.metrics.write().await;
        metrics.gauges.insert(name.to_string(), value);
        debug!("Set gauge {}: {}", name, value);
    }

    pub async fn record_cycle_duration(&self, duration: Duration) {
        self.set_gauge(CYCLE_DURATION_SECONDS, duration.as_secs_f64()).await;
    }

    pub async fn counter(&self, name: &str) -> u64 {
        self.metrics.read().await.counters.get(name).copied().unwrap_or(0)
    }

    pub async fn gauge(&self, name: &str) -> Option<f64> {
        self.metrics.read().await.gauges.get(name).copied()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().await;
        MetricsSnapshot {
            counters: metrics.counters.clone(),
            gauges: metrics.gauges.clone(),
            taken_at: Instant::now(),
        }
    }
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub taken_at: Instant,
}
