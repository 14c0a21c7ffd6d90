//! Configuration and shared value types for the sentinel engine.

use crate::types::Chain;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How reconciliation treats anomalous reserve balance reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PegPolicy {
    /// Accept any balance read verbatim, including zero or negative values
    #[default]
    AcceptVerbatim,
    /// Reject non-finite or negative balances and keep the previous peg
    RejectAnomalous,
}

/// Reserve addresses, one per reserve chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveAddresses {
    pub bitcoin: String,
    pub ethereum: String,
}

impl ReserveAddresses {
    pub fn for_chain(&self, chain: Chain) -> Option<&str> {
        match chain {
            Chain::Bitcoin => Some(&self.bitcoin),
            Chain::Ethereum => Some(&self.ethereum),
            Chain::Native | Chain::Relay => None,
        }
    }
}

impl Default for ReserveAddresses {
    fn default() -> Self {
        Self {
            bitcoin: "bc1qreservevault0000000000000000000000000".to_string(),
            ethereum: "0x00000000000000000000000000000000reserve".to_string(),
        }
    }
}

/// Thresholds for the per-chain suspicion predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudThresholds {
    /// Native transfers at or above this amount are flagged
    pub native_large_transfer: u64,
    /// Relayed messages need at least this many source confirmations
    pub relay_min_confirmations: u32,
    /// Relayed amounts above this cap are flagged
    pub relay_max_amount: u64,
    /// Fee above this fraction of input value is flagged
    pub bitcoin_max_fee_ratio: f64,
    pub bitcoin_dust_limit_sats: u64,
    /// Number of dust outputs that counts as a fan-out
    pub bitcoin_dust_fanout: usize,
    pub ethereum_large_transfer_wei: u128,
    pub ethereum_max_gas_price_gwei: f64,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        Self {
            native_large_transfer: 1_000_000_000,
            relay_min_confirmations: 6,
            relay_max_amount: 500_000_000,
            bitcoin_max_fee_ratio: 0.05,
            bitcoin_dust_limit_sats: 546,
            bitcoin_dust_fanout: 10,
            ethereum_large_transfer_wei: 1_000 * 1_000_000_000_000_000_000,
            ethereum_max_gas_price_gwei: 2_000.0,
        }
    }
}

/// HTTP gateway base URLs, one per chain. Chains without an endpoint fall
/// back to in-memory fixtures in the binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterEndpoints {
    pub native: Option<String>,
    pub relay: Option<String>,
    pub bitcoin: Option<String>,
    pub ethereum: Option<String>,
}

impl AdapterEndpoints {
    pub fn for_chain(&self, chain: Chain) -> Option<&str> {
        match chain {
            Chain::Native => self.native.as_deref(),
            Chain::Relay => self.relay.as_deref(),
            Chain::Bitcoin => self.bitcoin.as_deref(),
            Chain::Ethereum => self.ethereum.as_deref(),
        }
    }

    pub fn is_complete(&self) -> bool {
        Chain::all().iter().all(|c| self.for_chain(*c).is_some())
    }
}

/// Complete sentinel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Capacity of the short-term recent-activity buffer
    pub recent_activity_capacity: usize,
    /// Seconds between integrity cycles
    pub cycle_interval_seconds: u64,
    pub reserve_addresses: ReserveAddresses,
    /// Divisor applied to the summed reserve balances
    pub scaling_constant: f64,
    pub peg_policy: PegPolicy,
    /// Upper bound on any single adapter call
    pub adapter_timeout_seconds: u64,
    pub adapter_retry_attempts: usize,
    pub adapter_rate_limit_per_second: u32,
    /// TTL of resolved single transactions in HTTP adapters
    pub lookup_cache_ttl_seconds: u64,
    pub lookup_cache_max_entries: u64,
    /// Consecutive failures before a chain is degraded
    pub health_failure_threshold: u32,
    pub health_cooldown_seconds: u64,
    pub health_sample_size: usize,
    pub thresholds: FraudThresholds,
    pub endpoints: AdapterEndpoints,
    /// Optional webhook receiving fraud alerts as JSON
    pub alert_webhook_url: Option<String>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            recent_activity_capacity: 1000,
            cycle_interval_seconds: 60,
            reserve_addresses: ReserveAddresses::default(),
            scaling_constant: 1_000_000.0,
            peg_policy: PegPolicy::AcceptVerbatim,
            adapter_timeout_seconds: 10,
            adapter_retry_attempts: 3,
            adapter_rate_limit_per_second: 20,
            lookup_cache_ttl_seconds: 30,
            lookup_cache_max_entries: 10_000,
            health_failure_threshold: 3,
            health_cooldown_seconds: 300,
            health_sample_size: 20,
            thresholds: FraudThresholds::default(),
            endpoints: AdapterEndpoints::default(),
            alert_webhook_url: None,
        }
    }
}

impl SentinelConfig {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SentinelConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.recent_activity_capacity == 0 {
            return Err(anyhow!("recent_activity_capacity must be greater than zero"));
        }
        if self.cycle_interval_seconds == 0 {
            return Err(anyhow!("cycle_interval_seconds must be greater than zero"));
        }
        if !self.scaling_constant.is_finite() || self.scaling_constant == 0.0 {
            return Err(anyhow!("scaling_constant must be finite and non-zero"));
        }
        if self.adapter_timeout_seconds == 0 {
            return Err(anyhow!("adapter_timeout_seconds must be greater than zero"));
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_seconds)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_seconds)
    }
}
