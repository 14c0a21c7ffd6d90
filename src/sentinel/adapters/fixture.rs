//! In-memory ledger adapter.
//!
//! Serves a fixed ledger snapshot and reserve balances. Used by the demo
//! binary when no gateway endpoints are configured, and by tests, which can
//! toggle availability, add latency, and inspect call counts.

use crate::sentinel::adapters::{AdapterResult, LedgerAdapter, ReserveAdapter};
use crate::sentinel::error::AdapterError;
use crate::types::{
    BitcoinLedger, Chain, EthereumLedger, Ledger, NativeLedger, RelayLedger, Transaction,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::debug;

/// Adapter backed by an in-memory snapshot.
#[derive(Debug)]
pub struct FixtureLedgerAdapter {
    chain: Chain,
    ledger: RwLock<Ledger>,
    balances: RwLock<HashMap<String, f64>>,
    available: AtomicBool,
    delay: RwLock<Option<Duration>>,
    ledger_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    balance_calls: AtomicUsize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FixtureLedgerAdapter {
    /// Creates an adapter serving `ledger`; the chain is taken from the ledger variant.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            chain: ledger.chain(),
            ledger: RwLock::new(ledger),
            balances: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            delay: RwLock::new(None),
            ledger_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            balance_calls: AtomicUsize::new(0),
        }
    }

    /// Creates an adapter with an empty ledger for `chain`.
    pub fn empty(chain: Chain) -> Self {
        let ledger = match chain {
            Chain::Native => Ledger::Native(NativeLedger::default()),
            Chain::Relay => Ledger::Relay(RelayLedger::default()),
            Chain::Bitcoin => Ledger::Bitcoin(BitcoinLedger::default()),
            Chain::Ethereum => Ledger::Ethereum(EthereumLedger::default()),
        };
        Self::new(ledger)
    }

    pub fn with_balance(self, address: &str, balance: f64) -> Self {
        self.set_balance(address, balance);
        self
    }

    pub fn set_balance(&self, address: &str, balance: f64) {
        write(&self.balances).insert(address.to_string(), balance);
    }

    /// Replaces the served snapshot. The variant must match this adapter's chain.
    pub fn set_ledger(&self, ledger: Ledger) {
        if ledger.chain() == self.chain {
            *write(&self.ledger) = ledger;
        } else {
            debug!("Ignoring {} ledger for {} fixture", ledger.chain(), self.chain);
        }
    }

    /// Appends a transaction to the served snapshot if it belongs to this chain.
    pub fn push_transaction(&self, tx: Transaction) {
        let mut ledger = write(&self.ledger);
        match (&mut *ledger, tx) {
            (Ledger::Native(l), Transaction::Native(tx)) => l.transactions.push(tx),
            (Ledger::Relay(l), Transaction::Relay(tx)) => l.transactions.push(tx),
            (Ledger::Bitcoin(l), Transaction::Bitcoin(tx)) => l.transactions.push(tx),
            (Ledger::Ethereum(l), Transaction::Ethereum(tx)) => l.transactions.push(tx),
            (_, tx) => debug!("Ignoring {} transaction for {} fixture", tx.chain(), self.chain),
        }
    }

    /// When unavailable, every call fails with `AdapterError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Latency added before every call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *write(&self.delay) = delay;
    }

    pub fn ledger_calls(&self) -> usize {
        self.ledger_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    async fn simulate_network(&self) -> AdapterResult<()> {
        let delay = *read(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AdapterError::Unavailable {
                chain: self.chain,
                reason: "fixture marked unavailable".to_string(),
            })
        }
    }
}

#[async_trait]
impl LedgerAdapter for FixtureLedgerAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_full_ledger(&self) -> AdapterResult<Ledger> {
        self.ledger_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;
        Ok(read(&self.ledger).clone())
    }

    async fn get_transaction(&self, id: &str) -> AdapterResult<Transaction> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;
        read(&self.ledger).find(id).ok_or_else(|| AdapterError::NotFound {
            chain: self.chain,
            id: id.to_string(),
        })
    }
}

#[async_trait]
impl ReserveAdapter for FixtureLedgerAdapter {
    async fn get_reserve_balance(&self, address: &str) -> AdapterResult<f64> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;
        read(&self.balances)
            .get(address)
            .copied()
            .ok_or_else(|| AdapterError::UnknownAddress {
                chain: self.chain,
                address: address.to_string(),
            })
    }
}
