//! Fraud alert reporting.
//!
//! The reporter renders a human-readable message for a flagged transaction and
//! hands `(chain_tag, transaction_id, message)` to an [`AlertSink`]. Delivery is
//! fire-and-forget and duplicates are passed through unchanged.
//!
//! ```text
//!   detect_fraud / check_transaction
//!         │
//!         └─► FraudReporter.report() ──► AlertSink.deliver()
//!                                           ├─► LogSink
//!                                           ├─► ChannelSink (mpsc)
//!                                           └─► WebhookSink (HTTP POST)
//! ```

use crate::sentinel::classifier::SuspicionReason;
use crate::types::{Chain, Transaction};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_retry::{strategy::FixedInterval, Retry};
use tracing::{debug, info, warn};

const WEBHOOK_MAX_ATTEMPTS: usize = 3;
const WEBHOOK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// A single fraud alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub chain: Chain,
    pub transaction_id: String,
    pub message: String,
    pub reasons: Vec<SuspicionReason>,
    pub detected_at: DateTime<Utc>,
}

/// Destination for fraud alerts. Implementations must not block.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: FraudAlert);
}

/// Writes alerts to the tracing log.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: FraudAlert) {
        warn!(
            chain = %alert.chain,
            transaction_id = %alert.transaction_id,
            "FRAUD ALERT: {}",
            alert.message
        );
    }
}

/// Forwards alerts into a bounded channel, dropping them when the channel is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<FraudAlert>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<FraudAlert>) -> Self {
        Self { sender }
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: FraudAlert) {
        if let Err(e) = self.sender.try_send(alert) {
            warn!("Dropping fraud alert, channel unavailable: {}", e);
        }
    }
}

/// Keeps every delivered alert in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    alerts: Arc<Mutex<Vec<FraudAlert>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> Vec<FraudAlert> {
        match self.alerts.lock() {
            Ok(alerts) => alerts.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.alerts().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AlertSink for MemorySink {
    fn deliver(&self, alert: FraudAlert) {
        match self.alerts.lock() {
            Ok(mut alerts) => alerts.push(alert),
            Err(poisoned) => poisoned.into_inner().push(alert),
        }
    }
}

/// POSTs alerts as JSON to a webhook on a background task.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: String,
    retry_delay: Duration,
}

impl WebhookSink {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            retry_delay: WEBHOOK_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Up to three attempts; a non-2xx status counts as a failed attempt.
    pub async fn post_with_retries(&self, alert: &FraudAlert) -> anyhow::Result<()> {
        let strategy = FixedInterval::new(self.retry_delay).take(WEBHOOK_MAX_ATTEMPTS - 1);
        let mut attempt = 0;

        Retry::spawn(strategy, || {
            attempt += 1;
            self.post_once(alert, attempt)
        })
        .await?;

        debug!("Delivered alert for {} to webhook", alert.transaction_id);
        Ok(())
    }

    async fn post_once(&self, alert: &FraudAlert, attempt: usize) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .with_context(|| format!("webhook delivery failed (attempt {})", attempt));

        let result = match response {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => Err(anyhow!("webhook rejected alert (attempt {}): {}", attempt, response.status())),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!("Alert for {}: {:#}", alert.transaction_id, e);
        }
        result
    }
}

impl AlertSink for WebhookSink {
    fn deliver(&self, alert: FraudAlert) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sink = self.clone();
                handle.spawn(async move {
                    if let Err(e) = sink.post_with_retries(&alert).await {
                        warn!(
                            "Giving up on webhook alert for {} after {} attempts: {:#}",
                            alert.transaction_id, WEBHOOK_MAX_ATTEMPTS, e
                        );
                    }
                });
            }
            Err(_) => warn!("No async runtime; webhook alert for {} dropped", alert.transaction_id),
        }
    }
}

/// Delivers each alert to every inner sink.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn AlertSink>) {
        self.sinks.push(sink);
    }
}

impl AlertSink for FanoutSink {
    fn deliver(&self, alert: FraudAlert) {
        for sink in &self.sinks {
            sink.deliver(alert.clone());
        }
    }
}

/// Builds per-chain alert messages and forwards them to the sink.
#[derive(Clone)]
pub struct FraudReporter {
    sink: Arc<dyn AlertSink>,
}

impl FraudReporter {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Reports a flagged transaction. Calling twice yields two alerts.
    pub fn report(&self, tx: &Transaction, reasons: &[SuspicionReason]) {
        let alert = FraudAlert {
            chain: tx.chain(),
            transaction_id: tx.id().to_string(),
            message: Self::render_message(tx, reasons),
            reasons: reasons.to_vec(),
            detected_at: Utc::now(),
        };
        info!("Reporting suspicious {} transaction {}", alert.chain, alert.transaction_id);
        self.sink.deliver(alert);
    }

    fn render_message(tx: &Transaction, reasons: &[SuspicionReason]) -> String {
        let reason_list = reasons.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ");
        match tx {
            Transaction::Native(tx) => format!(
                "Suspicious native transfer {}: {} -> {} amount {} fee {} [{}]",
                tx.id, tx.from, tx.to, tx.amount, tx.fee, reason_list
            ),
            Transaction::Relay(tx) => format!(
                "Suspicious relay message {}: {} -> {} amount {} via {} with {} confirmations [{}]",
                tx.id, tx.source_chain, tx.destination_chain, tx.amount, tx.relayer, tx.confirmations, reason_list
            ),
            Transaction::Bitcoin(tx) => format!(
                "Suspicious bitcoin transaction {}: {} inputs ({} sats) -> {} outputs ({} sats) [{}]",
                tx.id,
                tx.inputs.len(),
                tx.input_value(),
                tx.outputs.len(),
                tx.output_value(),
                reason_list
            ),
            Transaction::Ethereum(tx) => format!(
                "Suspicious ethereum transaction {}: {} -> {} value {} wei at {} gwei [{}]",
                tx.id,
                tx.from,
                tx.to.as_deref().unwrap_or("<contract creation>"),
                tx.value_wei,
                tx.gas_price_gwei,
                reason_list
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeTransaction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    return;
                }
            }
        }
    }

    /// Answers one connection per status, in order, and counts requests.
    async fn webhook_answering(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/alerts", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                read_request(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 {} Status\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });
        (url, hits)
    }

    fn alert() -> FraudAlert {
        let sink = MemorySink::new();
        FraudReporter::new(Arc::new(sink.clone())).report(&flagged_native(), &[SuspicionReason::ZeroFee]);
        sink.alerts().remove(0)
    }

    fn flagged_native() -> Transaction {
        Transaction::Native(NativeTransaction {
            id: "txid_abc".to_string(),
            from: "mallory".to_string(),
            to: "mallory".to_string(),
            amount: 50,
            fee: 0,
            nonce: 9,
            timestamp: 0,
        })
    }

    #[test]
    fn test_report_renders_message() {
        let sink = MemorySink::new();
        let reporter = FraudReporter::new(Arc::new(sink.clone()));

        reporter.report(&flagged_native(), &[SuspicionReason::SelfTransfer, SuspicionReason::ZeroFee]);

        let alerts = sink.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].chain, Chain::Native);
        assert_eq!(alerts[0].transaction_id, "txid_abc");
        assert!(alerts[0].message.contains("self_transfer, zero_fee"));
    }

    #[test]
    fn test_duplicate_reports_are_kept() {
        let sink = MemorySink::new();
        let reporter = FraudReporter::new(Arc::new(sink.clone()));
        let tx = flagged_native();

        reporter.report(&tx, &[SuspicionReason::ZeroFee]);
        reporter.report(&tx, &[SuspicionReason::ZeroFee]);

        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_fanout_delivers_to_all() {
        let first = MemorySink::new();
        let second = MemorySink::new();
        let fanout = FanoutSink::new(vec![Arc::new(first.clone()), Arc::new(second.clone())]);
        let reporter = FraudReporter::new(Arc::new(fanout));

        reporter.report(&flagged_native(), &[SuspicionReason::ZeroFee]);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = FraudReporter::new(Arc::new(ChannelSink::new(tx)));

        reporter.report(&flagged_native(), &[SuspicionReason::ZeroFee]);
        reporter.report(&flagged_native(), &[SuspicionReason::ZeroFee]);

        let alert = rx.recv().await.unwrap();
        assert_eq!(alert.transaction_id, "txid_abc");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_webhook_retries_until_accepted() {
        let (url, hits) = webhook_answering(vec![500, 503, 200]).await;
        let sink = WebhookSink::new(Client::new(), url).with_retry_delay(Duration::from_millis(10));

        sink.post_with_retries(&alert()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_webhook_gives_up_after_max_attempts() {
        let (url, hits) = webhook_answering(vec![500, 500, 500, 500]).await;
        let sink = WebhookSink::new(Client::new(), url).with_retry_delay(Duration::from_millis(10));

        let err = sink.post_with_retries(&alert()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(hits.load(Ordering::SeqCst), WEBHOOK_MAX_ATTEMPTS);
    }
}
