//! Main entry point for the ledger sentinel daemon
//!
//! Runs the integrity cycle in the background and routes transaction
//! identifiers read line by line from stdin.

use anyhow::{Context, Result};
use ledger_sentinel::sentinel::{
    http_ledger_set, AlertSink, FanoutSink, FixtureLedgerAdapter, InputRouter, IntegrityCycle,
    LedgerSet, LogSink, SentinelBuilder, SentinelConfig, SentinelError, SubmitOutcome, WebhookSink,
};
use ledger_sentinel::types::{
    BitcoinLedger, BitcoinOutput, BitcoinTransaction, Chain, EthereumLedger, EthereumTransaction,
    Ledger, NativeLedger, NativeTransaction, RelayLedger, RelayTransaction,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(log_level())
        .init();

    info!("Starting ledger sentinel");

    let config = match std::env::var("SENTINEL_CONFIG") {
        Ok(path) => SentinelConfig::from_json_file(&path)?,
        Err(_) => {
            info!("SENTINEL_CONFIG not set, using defaults");
            SentinelConfig::default()
        }
    };

    let ledgers = if config.endpoints.is_complete() {
        info!("Using HTTP gateways for every chain");
        http_ledger_set(&config)?
    } else {
        warn!("Chain endpoints not fully configured, running against demo fixtures");
        demo_ledgers(&config)?
    };

    let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogSink)];
    if let Some(url) = &config.alert_webhook_url {
        let client = reqwest::Client::builder()
            .timeout(config.adapter_timeout())
            .build()
            .context("Failed to build webhook client")?;
        sinks.push(Arc::new(WebhookSink::new(client, url.clone())));
    }

    let sentinel = SentinelBuilder::from_config(config).build(ledgers, Arc::new(FanoutSink::new(sinks)))?;
    let router = InputRouter::new(sentinel.clone());
    let cycle = Arc::new(IntegrityCycle::new(sentinel.clone()));
    let cycle_handle = cycle.spawn();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let input = line.trim().to_string();
                    if input.is_empty() {
                        continue;
                    }
                    let router = router.clone();
                    tokio::spawn(async move { handle_input(&router, &input).await });
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    cycle_handle.abort();
    info!(
        "Shutting down: pegged value {}, {} suspicious transactions recorded",
        sentinel.pegged_value().await,
        sentinel.suspicious_log().await.len()
    );
    for (chain, stats) in sentinel.health_stats().await {
        info!(
            "{}: {:?}, {} consecutive failures, {:.0}% of last {} calls succeeded",
            chain,
            stats.state,
            stats.consecutive_failures,
            stats.success_rate * 100.0,
            stats.attempts
        );
    }
    Ok(())
}

async fn handle_input(router: &InputRouter, input: &str) {
    match router.submit(input).await {
        Ok(SubmitOutcome::Checked(verdict)) if verdict.is_suspicious() => {
            info!("{} on {} flagged: {:?}", verdict.transaction_id, verdict.chain, verdict.reasons)
        }
        Ok(SubmitOutcome::Checked(verdict)) => info!("{} on {} looks clean", verdict.transaction_id, verdict.chain),
        Ok(SubmitOutcome::Unrecognized) => info!("Recorded unrecognized input {:?}", input),
        Err(SentinelError::LookupFailure { id, chain, source }) => {
            warn!("Could not resolve {} on {}: {}", id, chain, source)
        }
        Err(e) => error!("Failed to handle {:?}: {}", input, e),
    }
}

fn log_level() -> Level {
    match std::env::var("SENTINEL_LOG").as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        Ok("warn") => Level::WARN,
        Ok("error") => Level::ERROR,
        _ => Level::INFO,
    }
}

/// In-memory ledgers with a handful of clean and suspicious transactions.
fn demo_ledgers(config: &SentinelConfig) -> Result<LedgerSet> {
    let addresses = &config.reserve_addresses;

    let native = FixtureLedgerAdapter::new(Ledger::Native(NativeLedger {
        height: 1,
        transactions: vec![
            NativeTransaction {
                id: "txid_demo_ok".to_string(),
                from: "alice".to_string(),
                to: "bob".to_string(),
                amount: 1_000,
                fee: 10,
                nonce: 1,
                timestamp: 1_700_000_000,
            },
            NativeTransaction {
                id: "txid_demo_self".to_string(),
                from: "mallory".to_string(),
                to: "mallory".to_string(),
                amount: 5_000,
                fee: 0,
                nonce: 7,
                timestamp: 1_700_000_060,
            },
        ],
    }));

    let relay = FixtureLedgerAdapter::new(Ledger::Relay(RelayLedger {
        height: 1,
        transactions: vec![RelayTransaction {
            id: "relay_demo_fast".to_string(),
            source_chain: Chain::Native.as_str().to_string(),
            destination_chain: Chain::Ethereum.as_str().to_string(),
            relayer: "relayer-1".to_string(),
            amount: 2_500,
            confirmations: 1,
            timestamp: 1_700_000_120,
        }],
    }));

    let bitcoin = FixtureLedgerAdapter::new(Ledger::Bitcoin(BitcoinLedger {
        height: 1,
        transactions: vec![BitcoinTransaction {
            id: "btc_demo_ok".to_string(),
            inputs: vec![BitcoinOutput { address: addresses.bitcoin.clone(), value_sats: 100_000 }],
            outputs: vec![BitcoinOutput { address: "bc1qpayee".to_string(), value_sats: 99_000 }],
            confirmations: 6,
            timestamp: 1_700_000_180,
        }],
    }))
    .with_balance(&addresses.bitcoin, 600_000.0);

    let ethereum = FixtureLedgerAdapter::new(Ledger::Ethereum(EthereumLedger {
        height: 1,
        transactions: vec![EthereumTransaction {
            id: "0xdemo_gas".to_string(),
            from: "0xsender".to_string(),
            to: Some(addresses.ethereum.clone()),
            value_wei: 1_000_000_000_000_000_000,
            gas_price_gwei: 5_000.0,
            nonce: 3,
            timestamp: 1_700_000_240,
        }],
    }))
    .with_balance(&addresses.ethereum, 400_000.0);

    LedgerSet::new(
        Arc::new(native),
        Arc::new(relay),
        Arc::new(bitcoin),
        Arc::new(ethereum),
        config.adapter_timeout(),
    )
}
