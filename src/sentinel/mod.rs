//! Sentinel module - cross-ledger integrity monitoring.
//!
//! The engine keeps one shared [`EngineState`](engine::EngineState) that two
//! activity sources mutate: the timer-driven [`IntegrityCycle`] (peg
//! reconciliation then a full fraud sweep) and the externally driven
//! [`InputRouter`] (record, route, look up, classify).

pub mod types;
pub mod error;
pub mod memory;
pub mod peg;
pub mod classifier;
pub mod reporter;
pub mod adapters;
pub mod health;
pub mod metrics;
pub mod engine;
pub mod cycle;
pub mod router;

// Re-export main public types and the engine
pub use engine::{CycleGuard, Sentinel, SharedSentinel, Verdict};
pub use error::{AdapterError, SentinelError, SentinelResult};
pub use types::{AdapterEndpoints, FraudThresholds, PegPolicy, ReserveAddresses, SentinelConfig};

// Re-export other key components for advanced usage
pub use adapters::{FixtureLedgerAdapter, HttpLedgerAdapter, LedgerAdapter, LedgerSet, ReserveAdapter};
pub use classifier::{FraudClassifier, SuspicionReason};
pub use cycle::{CycleOutcome, CycleReport, CycleState, IntegrityCycle};
pub use health::{ChainHealthStats, ChainHealthTracker, ChainState};
pub use memory::RecentActivityMemory;
pub use metrics::SentinelMetrics;
pub use peg::{PegReconciler, ReserveBalances};
pub use reporter::{AlertSink, ChannelSink, FanoutSink, FraudAlert, FraudReporter, LogSink, MemorySink, WebhookSink};
pub use router::{InputRouter, PrefixRule, SubmitOutcome};

use crate::types::Chain;
use anyhow::{anyhow, Context};
use reqwest::Client;
use std::sync::Arc;

/// Sentinel builder for convenient construction with sensible defaults.
pub struct SentinelBuilder {
    config: SentinelConfig,
}

impl SentinelBuilder {
    pub fn new() -> Self {
        Self {
            config: SentinelConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: SentinelConfig) -> Self {
        Self { config }
    }

    /// Set the recent-activity buffer capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.recent_activity_capacity = capacity;
        self
    }

    /// Set the integrity cycle interval in seconds.
    pub fn with_cycle_interval(mut self, seconds: u64) -> Self {
        self.config.cycle_interval_seconds = seconds;
        self
    }

    pub fn with_reserve_addresses(mut self, bitcoin: impl Into<String>, ethereum: impl Into<String>) -> Self {
        self.config.reserve_addresses = ReserveAddresses {
            bitcoin: bitcoin.into(),
            ethereum: ethereum.into(),
        };
        self
    }

    pub fn with_scaling_constant(mut self, scaling_constant: f64) -> Self {
        self.config.scaling_constant = scaling_constant;
        self
    }

    pub fn with_peg_policy(mut self, policy: PegPolicy) -> Self {
        self.config.peg_policy = policy;
        self
    }

    /// Set the per-call adapter timeout in seconds.
    pub fn with_adapter_timeout(mut self, seconds: u64) -> Self {
        self.config.adapter_timeout_seconds = seconds;
        self
    }

    pub fn with_thresholds(mut self, thresholds: FraudThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    /// Set chain health tracking.
    pub fn with_health(mut self, failure_threshold: u32, cooldown_seconds: u64) -> Self {
        self.config.health_failure_threshold = failure_threshold;
        self.config.health_cooldown_seconds = cooldown_seconds;
        self
    }

    pub fn with_endpoints(mut self, endpoints: AdapterEndpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn with_alert_webhook(mut self, url: impl Into<String>) -> Self {
        self.config.alert_webhook_url = Some(url.into());
        self
    }

    /// Build the sentinel configuration.
    pub fn build_config(self) -> SentinelConfig {
        self.config
    }

    /// Build the engine over the given adapters.
    pub fn build(self, ledgers: LedgerSet, sink: Arc<dyn AlertSink>) -> anyhow::Result<SharedSentinel> {
        self.config.validate()?;
        Ok(Arc::new(Sentinel::new(self.config, ledgers, sink)))
    }

    /// Build the engine over HTTP gateways for every chain.
    pub fn build_http(self, sink: Arc<dyn AlertSink>) -> anyhow::Result<SharedSentinel> {
        let ledgers = http_ledger_set(&self.config)?;
        self.build(ledgers, sink)
    }
}

impl Default for SentinelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP adapters for every chain, from the configured endpoints.
pub fn http_ledger_set(config: &SentinelConfig) -> anyhow::Result<LedgerSet> {
    let client = Client::builder()
        .timeout(config.adapter_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let endpoint = |chain: Chain| {
        config
            .endpoints
            .for_chain(chain)
            .ok_or_else(|| anyhow!("no endpoint configured for {}", chain))
    };
    let adapter = |chain: Chain| -> anyhow::Result<Arc<HttpLedgerAdapter>> {
        Ok(Arc::new(HttpLedgerAdapter::new(chain, endpoint(chain)?, client.clone(), config)?))
    };

    LedgerSet::new(
        adapter(Chain::Native)?,
        adapter(Chain::Relay)?,
        adapter(Chain::Bitcoin)?,
        adapter(Chain::Ethereum)?,
        config.adapter_timeout(),
    )
}
