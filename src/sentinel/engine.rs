//! The sentinel engine.
//!
//! [`Sentinel`] owns the single mutable [`EngineState`] and is shared by handle
//! between the integrity cycle and the input router. The state lock is only held
//! for in-memory mutation; no adapter call ever happens under it.
//!
//! The engine also owns the integrity-cycle slot and chain health, so any number
//! of orchestrators over one engine still run at most one cycle at a time.

use crate::sentinel::adapters::LedgerSet;
use crate::sentinel::classifier::{FraudClassifier, SuspicionReason};
use crate::sentinel::error::{SentinelError, SentinelResult};
use crate::sentinel::health::{ChainHealthStats, ChainHealthTracker};
use crate::sentinel::memory::RecentActivityMemory;
use crate::sentinel::metrics::{
    SentinelMetrics, INPUTS_RECORDED, LOOKUPS_FAILED, PEGGED_VALUE, TRANSACTIONS_FLAGGED,
    TRANSACTIONS_SCANNED,
};
use crate::sentinel::peg::{PegReconciler, ReserveBalances};
use crate::sentinel::reporter::{AlertSink, FraudReporter};
use crate::sentinel::types::{ReserveAddresses, SentinelConfig};
use crate::types::{Chain, Ledger, Transaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

/// Mutable state shared by every activity source.
#[derive(Debug)]
pub struct EngineState {
    memory: RecentActivityMemory,
    suspicious_log: Vec<String>,
    pegged_value: f64,
    reserve_addresses: ReserveAddresses,
}

impl EngineState {
    fn new(capacity: usize, reserve_addresses: ReserveAddresses) -> Self {
        Self {
            memory: RecentActivityMemory::new(capacity),
            suspicious_log: Vec::new(),
            pegged_value: 0.0,
            reserve_addresses,
        }
    }
}

/// Result of classifying one looked-up transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub chain: Chain,
    pub transaction_id: String,
    pub reasons: Vec<SuspicionReason>,
}

impl Verdict {
    pub fn is_suspicious(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Shared sentinel handle.
pub type SharedSentinel = Arc<Sentinel>;

/// Exclusive claim on the engine's integrity-cycle slot, released on drop.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    in_flight: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Cross-ledger monitoring engine.
pub struct Sentinel {
    config: SentinelConfig,
    state: Mutex<EngineState>,
    ledgers: LedgerSet,
    classifier: FraudClassifier,
    reporter: FraudReporter,
    reconciler: PegReconciler,
    metrics: SentinelMetrics,
    peg_sender: watch::Sender<f64>,
    health: Mutex<ChainHealthTracker>,
    cycle_in_flight: AtomicBool,
}

impl Sentinel {
    pub fn new(config: SentinelConfig, ledgers: LedgerSet, sink: Arc<dyn AlertSink>) -> Self {
        let state = EngineState::new(config.recent_activity_capacity, config.reserve_addresses.clone());
        let (peg_sender, _) = watch::channel(state.pegged_value);
        let health = ChainHealthTracker::new(
            config.health_failure_threshold,
            config.health_cooldown_seconds,
            config.health_sample_size,
        );

        info!(
            "Created sentinel: capacity {}, cycle every {}s, scaling constant {}",
            config.recent_activity_capacity, config.cycle_interval_seconds, config.scaling_constant
        );

        Self {
            classifier: FraudClassifier::new(config.thresholds.clone()),
            reporter: FraudReporter::new(sink),
            reconciler: PegReconciler::new(config.scaling_constant, config.peg_policy),
            state: Mutex::new(state),
            ledgers,
            metrics: SentinelMetrics::new(),
            peg_sender,
            health: Mutex::new(health),
            cycle_in_flight: AtomicBool::new(false),
            config,
        }
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    pub fn ledgers(&self) -> &LedgerSet {
        &self.ledgers
    }

    pub fn classifier(&self) -> &FraudClassifier {
        &self.classifier
    }

    pub fn metrics(&self) -> &SentinelMetrics {
        &self.metrics
    }

    /// Claims the integrity-cycle slot, or `None` if a cycle is already running.
    pub fn try_begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.cycle_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard { in_flight: &self.cycle_in_flight })
    }

    pub fn cycle_in_progress(&self) -> bool {
        self.cycle_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn health(&self) -> &Mutex<ChainHealthTracker> {
        &self.health
    }

    pub async fn health_stats(&self) -> HashMap<Chain, ChainHealthStats> {
        self.health.lock().await.stats()
    }

    /// Records a raw input in recent-activity memory.
    pub async fn record_input(&self, input: &str) {
        self.state.lock().await.memory.record(input);
        self.metrics.increment_counter(INPUTS_RECORDED).await;
    }

    /// Recomputes and stores the pegged value. On error the previous value is kept.
    pub async fn reconcile(&self, balances: ReserveBalances) -> SentinelResult<f64> {
        let peg = self.reconciler.compute(balances)?;
        self.state.lock().await.pegged_value = peg;
        self.peg_sender.send_replace(peg);
        self.metrics.set_gauge(PEGGED_VALUE, peg).await;
        info!(
            "Pegged value reconciled to {} (btc {}, eth {})",
            peg, balances.bitcoin, balances.ethereum
        );
        Ok(peg)
    }

    /// Classifies every transaction of every ledger and flags the suspicious ones.
    /// Returns the number of transactions flagged.
    #[instrument(skip(self, ledgers), fields(ledgers = ledgers.len()))]
    pub async fn detect_fraud(&self, ledgers: &[Ledger]) -> usize {
        let mut flagged = 0;
        let mut scanned = 0;

        for ledger in ledgers {
            for tx in ledger.transactions() {
                scanned += 1;
                if !self.classifier.classify(&tx) {
                    continue;
                }
                let reasons = self.classifier.suspicion_reasons(&tx);
                self.flag(&tx, &reasons).await;
                flagged += 1;
            }
            debug!("Swept {} ledger ({} transactions)", ledger.chain(), ledger.len());
        }

        self.metrics.add_to_counter(TRANSACTIONS_SCANNED, scanned).await;
        if flagged > 0 {
            warn!("Fraud sweep flagged {} of {} transactions", flagged, scanned);
        }
        flagged
    }

    /// Resolves one transaction on `chain` and classifies it.
    #[instrument(skip(self, chain), fields(chain = %chain))]
    pub async fn check_transaction(&self, id: &str, chain: Chain) -> SentinelResult<Verdict> {
        let tx = match self.ledgers.get_transaction(chain, id).await {
            Ok(tx) => tx,
            Err(source) => {
                warn!("Lookup of {} on {} failed: {}", id, chain, source);
                self.metrics.increment_counter(LOOKUPS_FAILED).await;
                return Err(SentinelError::LookupFailure { id: id.to_string(), chain, source });
            }
        };

        let reasons = self.classifier.suspicion_reasons(&tx);
        if !reasons.is_empty() {
            self.flag(&tx, &reasons).await;
        }
        Ok(Verdict {
            chain,
            transaction_id: tx.id().to_string(),
            reasons,
        })
    }

    async fn flag(&self, tx: &Transaction, reasons: &[SuspicionReason]) {
        self.state.lock().await.suspicious_log.push(tx.id().to_string());
        self.metrics.increment_counter(TRANSACTIONS_FLAGGED).await;
        self.reporter.report(tx, reasons);
    }

    pub async fn pegged_value(&self) -> f64 {
        self.state.lock().await.pegged_value
    }

    /// Receiver that always holds the latest pegged value.
    pub fn subscribe_peg(&self) -> watch::Receiver<f64> {
        self.peg_sender.subscribe()
    }

    /// Copy of the suspicious-transaction log in append order.
    pub async fn suspicious_log(&self) -> Vec<String> {
        self.state.lock().await.suspicious_log.clone()
    }

    /// Recent inputs, oldest first.
    pub async fn recent_inputs(&self) -> Vec<String> {
        self.state.lock().await.memory.recent()
    }

    pub async fn input_count(&self, input: &str) -> u64 {
        self.state.lock().await.memory.count(input)
    }

    /// Recent inputs containing `query`, newest first.
    pub async fn search_recent(&self, query: &str) -> Vec<String> {
        self.state.lock().await.memory.search(query)
    }

    pub async fn most_frequent(&self, n: usize) -> Vec<(String, u64)> {
        self.state.lock().await.memory.most_frequent(n)
    }

    pub async fn reserve_addresses(&self) -> ReserveAddresses {
        self.state.lock().await.reserve_addresses.clone()
    }
}
