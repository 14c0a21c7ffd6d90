use ledger_sentinel::sentinel::metrics::{CHAIN_FETCH_FAILURES, CYCLES_COMPLETED};
use ledger_sentinel::sentinel::{
    AdapterError, AlertSink, CycleOutcome, FixtureLedgerAdapter, FraudAlert, IntegrityCycle,
    LedgerSet, MemorySink, PegPolicy, ReserveBalances, SentinelBuilder, SentinelError,
    SharedSentinel,
};
use ledger_sentinel::types::{
    BitcoinLedger, BitcoinOutput, BitcoinTransaction, Chain, Ledger, NativeLedger,
    NativeTransaction,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

const BTC_VAULT: &str = "btc-vault";
const ETH_VAULT: &str = "eth-vault";

struct Fixtures {
    native: Arc<FixtureLedgerAdapter>,
    relay: Arc<FixtureLedgerAdapter>,
    bitcoin: Arc<FixtureLedgerAdapter>,
    ethereum: Arc<FixtureLedgerAdapter>,
}

impl Fixtures {
    fn new() -> Self {
        Self {
            native: Arc::new(FixtureLedgerAdapter::empty(Chain::Native)),
            relay: Arc::new(FixtureLedgerAdapter::empty(Chain::Relay)),
            bitcoin: Arc::new(FixtureLedgerAdapter::empty(Chain::Bitcoin).with_balance(BTC_VAULT, 300.0)),
            ethereum: Arc::new(FixtureLedgerAdapter::empty(Chain::Ethereum).with_balance(ETH_VAULT, 100.0)),
        }
    }

    fn ledger_set(&self, timeout: Duration) -> LedgerSet {
        LedgerSet::new(
            self.native.clone(),
            self.relay.clone(),
            self.bitcoin.clone(),
            self.ethereum.clone(),
            timeout,
        )
        .unwrap()
    }
}

fn builder() -> SentinelBuilder {
    SentinelBuilder::new()
        .with_reserve_addresses(BTC_VAULT, ETH_VAULT)
        .with_scaling_constant(100.0)
}

fn native_tx(id: &str, fee: u64) -> NativeTransaction {
    NativeTransaction {
        id: id.to_string(),
        from: "alice".to_string(),
        to: "bob".to_string(),
        amount: 50,
        fee,
        nonce: 0,
        timestamp: 1_700_000_000,
    }
}

/// Captures the pegged value visible at the moment each alert is delivered.
#[derive(Default)]
struct PegObservingSink {
    peg: Mutex<Option<watch::Receiver<f64>>>,
    seen: Mutex<Vec<f64>>,
}

impl AlertSink for PegObservingSink {
    fn deliver(&self, _alert: FraudAlert) {
        if let Some(rx) = self.peg.lock().unwrap().as_ref() {
            self.seen.lock().unwrap().push(*rx.borrow());
        }
    }
}

#[tokio::test]
async fn test_recent_inputs_keep_tail_within_capacity() {
    let fixtures = Fixtures::new();
    let sentinel = builder()
        .with_capacity(3)
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(MemorySink::new()))
        .unwrap();

    for input in ["a", "b", "c", "d", "a"] {
        sentinel.record_input(input).await;
    }

    assert_eq!(sentinel.recent_inputs().await, vec!["c", "d", "a"]);
    assert_eq!(sentinel.input_count("a").await, 2);
    assert_eq!(sentinel.input_count("b").await, 1);
    assert_eq!(sentinel.most_frequent(1).await, vec![("a".to_string(), 2)]);
}

#[tokio::test]
async fn test_reconcile_ignores_activity_state() {
    let fixtures = Fixtures::new();
    let sentinel = builder()
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(MemorySink::new()))
        .unwrap();
    let balances = ReserveBalances { bitcoin: 300.0, ethereum: 100.0 };

    let first = sentinel.reconcile(balances).await.unwrap();
    sentinel.record_input("txid_noise").await;
    sentinel.detect_fraud(&[Ledger::Native(NativeLedger {
        height: 1,
        transactions: vec![native_tx("txid_flag", 0)],
    })]).await;
    let second = sentinel.reconcile(balances).await.unwrap();

    assert_eq!(first, 4.0);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_anomalous_balance_policies() {
    let fixtures = Fixtures::new();
    let verbatim = builder()
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(MemorySink::new()))
        .unwrap();
    assert_eq!(verbatim.reconcile(ReserveBalances { bitcoin: -100.0, ethereum: 0.0 }).await.unwrap(), -1.0);

    let strict = builder()
        .with_peg_policy(PegPolicy::RejectAnomalous)
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(MemorySink::new()))
        .unwrap();
    strict.reconcile(ReserveBalances { bitcoin: 300.0, ethereum: 100.0 }).await.unwrap();
    let err = strict
        .reconcile(ReserveBalances { bitcoin: f64::NAN, ethereum: 100.0 })
        .await
        .unwrap_err();
    assert!(matches!(err, SentinelError::InvalidReserveBalance { chain: Chain::Bitcoin, .. }));
    assert_eq!(strict.pegged_value().await, 4.0);
}

#[tokio::test]
async fn test_clean_sweep_changes_nothing() {
    let fixtures = Fixtures::new();
    let sink = MemorySink::new();
    let sentinel = builder()
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(sink.clone()))
        .unwrap();

    let flagged = sentinel
        .detect_fraud(&[Ledger::Native(NativeLedger {
            height: 1,
            transactions: vec![native_tx("txid_1", 1), native_tx("txid_2", 1)],
        })])
        .await;

    assert_eq!(flagged, 0);
    assert!(sentinel.suspicious_log().await.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_cycle_reconciles_before_sweep() {
    let fixtures = Fixtures::new();
    fixtures.bitcoin.set_ledger(Ledger::Bitcoin(BitcoinLedger {
        height: 10,
        transactions: vec![BitcoinTransaction {
            id: "btc_inflate".to_string(),
            inputs: vec![BitcoinOutput { address: "in".to_string(), value_sats: 1_000 }],
            outputs: vec![BitcoinOutput { address: "out".to_string(), value_sats: 5_000 }],
            confirmations: 3,
            timestamp: 1_700_000_000,
        }],
    }));

    let sink = Arc::new(PegObservingSink::default());
    let sentinel: SharedSentinel = builder()
        .build(fixtures.ledger_set(Duration::from_secs(1)), sink.clone())
        .unwrap();
    *sink.peg.lock().unwrap() = Some(sentinel.subscribe_peg());

    let cycle = IntegrityCycle::new(sentinel.clone());
    let CycleOutcome::Completed(report) = cycle.run_cycle().await else {
        panic!("cycle should not be skipped");
    };

    assert_eq!(report.peg, Some(4.0));
    assert_eq!(report.flagged, 1);
    assert_eq!(*sink.seen.lock().unwrap(), vec![4.0]);
    assert_eq!(sentinel.suspicious_log().await, vec!["btc_inflate"]);
    assert_eq!(sentinel.metrics().counter(CYCLES_COMPLETED).await, 1);
}

#[tokio::test]
async fn test_cycle_survives_unavailable_chain() {
    let fixtures = Fixtures::new();
    fixtures.native.set_ledger(Ledger::Native(NativeLedger {
        height: 5,
        transactions: vec![native_tx("txid_zero_fee", 0)],
    }));
    fixtures.relay.set_available(false);

    let sink = MemorySink::new();
    let sentinel = builder()
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(sink.clone()))
        .unwrap();
    let cycle = IntegrityCycle::new(sentinel.clone());

    let CycleOutcome::Completed(report) = cycle.run_cycle().await else {
        panic!("cycle should not be skipped");
    };

    assert_eq!(report.failed, vec![Chain::Relay]);
    assert_eq!(report.peg, Some(4.0));
    assert_eq!(sentinel.suspicious_log().await, vec!["txid_zero_fee"]);
    assert_eq!(sink.len(), 1);
    assert_eq!(sentinel.metrics().counter(CHAIN_FETCH_FAILURES).await, 1);
}

#[tokio::test]
async fn test_missing_reserve_balance_keeps_peg_but_still_sweeps() {
    let fixtures = Fixtures::new();
    fixtures.native.set_ledger(Ledger::Native(NativeLedger {
        height: 5,
        transactions: vec![native_tx("txid_zero_fee", 0)],
    }));
    let sentinel = builder()
        .with_reserve_addresses("nobody", ETH_VAULT)
        .build(fixtures.ledger_set(Duration::from_secs(1)), Arc::new(MemorySink::new()))
        .unwrap();
    let cycle = IntegrityCycle::new(sentinel.clone());

    let CycleOutcome::Completed(report) = cycle.run_cycle().await else {
        panic!("cycle should not be skipped");
    };

    assert_eq!(report.peg, None);
    assert_eq!(sentinel.pegged_value().await, 0.0);
    assert_eq!(report.flagged, 1);
}

#[tokio::test]
async fn test_slow_adapter_times_out() {
    let fixtures = Fixtures::new();
    fixtures.ethereum.set_delay(Some(Duration::from_millis(500)));
    let ledgers = fixtures.ledger_set(Duration::from_millis(50));

    let err = ledgers.get_full_ledger(Chain::Ethereum).await.unwrap_err();
    assert!(matches!(err, AdapterError::Timeout { chain: Chain::Ethereum, .. }));

    let sentinel = builder().build(ledgers, Arc::new(MemorySink::new())).unwrap();
    let cycle = IntegrityCycle::new(sentinel);
    let CycleOutcome::Completed(report) = cycle.run_cycle().await else {
        panic!("cycle should not be skipped");
    };
    assert_eq!(report.failed, vec![Chain::Ethereum]);
    assert_eq!(report.peg, None);
}
