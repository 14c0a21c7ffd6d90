//! Ledger Sentinel - cross-ledger integrity monitoring
//!
//! This crate watches four ledgers (a native chain, a relay layer and two
//! reserve chains), keeps a pegged value reconciled against reserve balances,
//! flags suspicious transactions, and remembers recently submitted inputs.

pub mod types;
pub mod sentinel;

// Re-export main types for convenience
pub use types::{Chain, Ledger, Transaction};
pub use sentinel::{InputRouter, IntegrityCycle, Sentinel, SentinelBuilder, SentinelConfig};
