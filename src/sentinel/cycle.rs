//! Integrity cycle orchestrator.
//!
//! On every tick: fetch all four ledgers and both reserve balances
//! concurrently, reconcile the peg, then sweep every fetched ledger for fraud.
//! Reconciliation always completes before the sweep starts. At most one cycle
//! runs at a time per engine, however many orchestrators share it; a tick that
//! arrives mid-cycle is skipped.

use crate::sentinel::engine::SharedSentinel;
use crate::sentinel::error::AdapterError;
use crate::sentinel::metrics::{CHAIN_FETCH_FAILURES, CYCLES_COMPLETED, CYCLES_SKIPPED};
use crate::sentinel::peg::ReserveBalances;
use crate::types::{Chain, Ledger};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

/// Shortest tick period the loop will run with.
pub const MIN_CYCLE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for the next tick
    Idle,
    /// A cycle is in progress
    Reconciling,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Chains whose ledger was fetched
    pub fetched: Vec<Chain>,
    /// Chains whose ledger fetch failed or was skipped
    pub failed: Vec<Chain>,
    /// New pegged value, if reconciliation ran
    pub peg: Option<f64>,
    pub scanned: usize,
    pub flagged: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was already in flight on the same engine
    Skipped,
}

/// Scheduled reconcile-and-sweep loop.
pub struct IntegrityCycle {
    sentinel: SharedSentinel,
    interval: Duration,
}

impl IntegrityCycle {
    pub fn new(sentinel: SharedSentinel) -> Self {
        let configured = sentinel.config().cycle_interval();
        if configured < MIN_CYCLE_INTERVAL {
            warn!(
                "Cycle interval {:?} is below the minimum, using {:?}",
                configured, MIN_CYCLE_INTERVAL
            );
        }
        Self {
            interval: configured.max(MIN_CYCLE_INTERVAL),
            sentinel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reflects the engine, so a cycle started by another orchestrator counts.
    pub fn state(&self) -> CycleState {
        if self.sentinel.cycle_in_progress() {
            CycleState::Reconciling
        } else {
            CycleState::Idle
        }
    }

    /// Runs cycles on the configured interval until the task is dropped.
    pub async fn run(&self) {
        info!("Integrity cycle running every {}s", self.interval.as_secs());
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            match self.run_cycle().await {
                CycleOutcome::Completed(report) => info!(
                    "Cycle complete: fetched {:?}, failed {:?}, peg {:?}, flagged {}/{}",
                    report.fetched, report.failed, report.peg, report.flagged, report.scanned
                ),
                CycleOutcome::Skipped => warn!("Previous cycle still running, tick skipped"),
            }
        }
    }

    /// Spawns [`run`](Self::run) on its own task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Runs one cycle now, unless one is already in flight on this engine.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_slot) = self.sentinel.try_begin_cycle() else {
            self.sentinel.metrics().increment_counter(CYCLES_SKIPPED).await;
            return CycleOutcome::Skipped;
        };
        let started = Instant::now();

        let allowed: HashMap<Chain, bool> = {
            let mut health = self.sentinel.health().lock().await;
            Chain::all().into_iter().map(|c| (c, health.is_available(c))).collect()
        };
        let is_allowed = |chain: Chain| allowed.get(&chain).copied().unwrap_or(true);

        let addresses = self.sentinel.reserve_addresses().await;
        let (native, relay, bitcoin, ethereum, btc_balance, eth_balance) = tokio::join!(
            self.fetch_ledger(Chain::Native, is_allowed(Chain::Native)),
            self.fetch_ledger(Chain::Relay, is_allowed(Chain::Relay)),
            self.fetch_ledger(Chain::Bitcoin, is_allowed(Chain::Bitcoin)),
            self.fetch_ledger(Chain::Ethereum, is_allowed(Chain::Ethereum)),
            self.fetch_balance(Chain::Bitcoin, &addresses.bitcoin, is_allowed(Chain::Bitcoin)),
            self.fetch_balance(Chain::Ethereum, &addresses.ethereum, is_allowed(Chain::Ethereum)),
        );

        let mut ledgers = Vec::new();
        let mut fetched = Vec::new();
        let mut failed = Vec::new();
        for (chain, result) in [
            (Chain::Native, native),
            (Chain::Relay, relay),
            (Chain::Bitcoin, bitcoin),
            (Chain::Ethereum, ethereum),
        ] {
            match result {
                Some(ledger) => {
                    fetched.push(chain);
                    ledgers.push(ledger);
                }
                None => failed.push(chain),
            }
        }
        if !failed.is_empty() {
            self.sentinel
                .metrics()
                .add_to_counter(CHAIN_FETCH_FAILURES, failed.len() as u64)
                .await;
        }

        let balances: HashMap<Chain, f64> = [(Chain::Bitcoin, btc_balance), (Chain::Ethereum, eth_balance)]
            .into_iter()
            .filter_map(|(chain, balance)| balance.map(|b| (chain, b)))
            .collect();
        let peg = match ReserveBalances::from_map(&balances) {
            Ok(balances) => match self.sentinel.reconcile(balances).await {
                Ok(peg) => Some(peg),
                Err(e) => {
                    warn!("Reconciliation rejected: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("{}, keeping previous pegged value", e);
                None
            }
        };

        let scanned = ledgers.iter().map(Ledger::len).sum();
        let flagged = self.sentinel.detect_fraud(&ledgers).await;

        self.sentinel.metrics().increment_counter(CYCLES_COMPLETED).await;
        self.sentinel.metrics().record_cycle_duration(started.elapsed()).await;

        CycleOutcome::Completed(CycleReport {
            fetched,
            failed,
            peg,
            scanned,
            flagged,
        })
    }

    async fn fetch_ledger(&self, chain: Chain, allowed: bool) -> Option<Ledger> {
        if !allowed {
            warn!("{} is cooling down, skipping ledger fetch", chain);
            return None;
        }
        let result = self.sentinel.ledgers().get_full_ledger(chain).await;
        self.observe(chain, &result).await;
        result.ok()
    }

    async fn fetch_balance(&self, chain: Chain, address: &str, allowed: bool) -> Option<f64> {
        if !allowed {
            return None;
        }
        let result = self.sentinel.ledgers().get_reserve_balance(chain, address).await;
        self.observe(chain, &result).await;
        result.ok()
    }

    async fn observe<T>(&self, chain: Chain, result: &Result<T, AdapterError>) {
        let mut health = self.sentinel.health().lock().await;
        match result {
            Ok(_) => health.record_success(chain),
            Err(e) if e.is_transient() => {
                warn!("{} unavailable this cycle: {}", chain, e);
                health.record_failure(chain);
            }
            Err(e) => error!("{} rejected cycle request: {}", chain, e),
        }
    }
}
