//! Peg reconciliation.
//!
//! The pegged value is `(bitcoin_reserve + ethereum_reserve) / scaling_constant`.
//! No history is kept; every reconciliation replaces the previous value.

use crate::sentinel::error::{SentinelError, SentinelResult};
use crate::sentinel::types::PegPolicy;
use crate::types::Chain;
use std::collections::HashMap;
use tracing::warn;

/// The two reserve balances that back the peg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReserveBalances {
    pub bitcoin: f64,
    pub ethereum: f64,
}

impl ReserveBalances {
    /// Builds balances from a chain-keyed map; both reserve chains must be present.
    pub fn from_map(balances: &HashMap<Chain, f64>) -> SentinelResult<Self> {
        let get = |chain: Chain| {
            balances
                .get(&chain)
                .copied()
                .ok_or(SentinelError::MissingReserveBalance { chain })
        };
        Ok(Self {
            bitcoin: get(Chain::Bitcoin)?,
            ethereum: get(Chain::Ethereum)?,
        })
    }
}

/// Computes the pegged value from reserve balances.
#[derive(Debug, Clone)]
pub struct PegReconciler {
    scaling_constant: f64,
    policy: PegPolicy,
}

impl PegReconciler {
    pub fn new(scaling_constant: f64, policy: PegPolicy) -> Self {
        Self { scaling_constant, policy }
    }

    pub fn policy(&self) -> PegPolicy {
        self.policy
    }

    /// Pure function of the two balances under the configured policy.
    pub fn compute(&self, balances: ReserveBalances) -> SentinelResult<f64> {
        if self.policy == PegPolicy::RejectAnomalous {
            for (chain, value) in [(Chain::Bitcoin, balances.bitcoin), (Chain::Ethereum, balances.ethereum)] {
                if !value.is_finite() || value < 0.0 {
                    warn!("Rejecting anomalous {} reserve balance: {}", chain, value);
                    return Err(SentinelError::InvalidReserveBalance { chain, value });
                }
            }
        }
        Ok((balances.bitcoin + balances.ethereum) / self.scaling_constant)
    }
}
