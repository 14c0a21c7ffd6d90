//! Error types for ledger adapters and the engine.

use crate::types::Chain;
use thiserror::Error;

/// Failure reported by a ledger adapter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("{chain} adapter unavailable: {reason}")]
    Unavailable { chain: Chain, reason: String },

    #[error("transaction {id} not found on {chain}")]
    NotFound { chain: Chain, id: String },

    #[error("unknown reserve address {address} on {chain}")]
    UnknownAddress { chain: Chain, address: String },

    #[error("{chain} adapter call timed out after {millis}ms")]
    Timeout { chain: Chain, millis: u64 },

    #[error("{chain} adapter returned malformed data: {reason}")]
    Decode { chain: Chain, reason: String },
}

impl AdapterError {
    /// Transient failures are retried by adapters and skipped by the cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::Unavailable { .. } | AdapterError::Timeout { .. } | AdapterError::Decode { .. }
        )
    }

    pub fn chain(&self) -> Chain {
        match self {
            AdapterError::Unavailable { chain, .. }
            | AdapterError::NotFound { chain, .. }
            | AdapterError::UnknownAddress { chain, .. }
            | AdapterError::Timeout { chain, .. }
            | AdapterError::Decode { chain, .. } => *chain,
        }
    }
}

/// Failure surfaced to callers of the engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SentinelError {
    #[error("lookup of {id} on {chain} failed: {source}")]
    LookupFailure {
        id: String,
        chain: Chain,
        #[source]
        source: AdapterError,
    },

    #[error("reserve balance for {chain} is not usable: {value}")]
    InvalidReserveBalance { chain: Chain, value: f64 },

    #[error("reserve balance for {chain} is missing")]
    MissingReserveBalance { chain: Chain },
}

pub type SentinelResult<T> = std::result::Result<T, SentinelError>;
