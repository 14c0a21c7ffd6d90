//! Ledger adapter contracts and the per-chain adapter set.
//!
//! Adapters are the only code that talks to a chain. The engine reaches them
//! through [`LedgerSet`], which dispatches on the [`Chain`] tag and bounds
//! every call with the configured timeout.

pub mod fixture;
pub mod http;

pub use fixture::FixtureLedgerAdapter;
pub use http::HttpLedgerAdapter;

use crate::sentinel::error::AdapterError;
use crate::types::{Chain, Ledger, Transaction};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use anyhow::anyhow;

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Read access to one chain.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Chain this adapter reads from.
    fn chain(&self) -> Chain;

    /// Fetch the full transaction set as of now.
    async fn get_full_ledger(&self) -> AdapterResult<Ledger>;

    /// Resolve a single transaction by id.
    async fn get_transaction(&self, id: &str) -> AdapterResult<Transaction>;
}

/// Read access to a reserve chain, which additionally exposes balances.
#[async_trait]
pub trait ReserveAdapter: LedgerAdapter {
    async fn get_reserve_balance(&self, address: &str) -> AdapterResult<f64>;
}

/// One adapter per chain.
#[derive(Clone)]
pub struct LedgerSet {
    native: Arc<dyn LedgerAdapter>,
    relay: Arc<dyn LedgerAdapter>,
    bitcoin: Arc<dyn ReserveAdapter>,
    ethereum: Arc<dyn ReserveAdapter>,
    timeout: Duration,
}

impl LedgerSet {
    pub fn new(
        native: Arc<dyn LedgerAdapter>,
        relay: Arc<dyn LedgerAdapter>,
        bitcoin: Arc<dyn ReserveAdapter>,
        ethereum: Arc<dyn ReserveAdapter>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        for (expected, actual) in [
            (Chain::Native, native.chain()),
            (Chain::Relay, relay.chain()),
            (Chain::Bitcoin, bitcoin.chain()),
            (Chain::Ethereum, ethereum.chain()),
        ] {
            if expected != actual {
                return Err(anyhow!("adapter in the {} slot reads from {}", expected, actual));
            }
        }
        Ok(Self { native, relay, bitcoin, ethereum, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn get_full_ledger(&self, chain: Chain) -> AdapterResult<Ledger> {
        let call = async {
            match chain {
                Chain::Native => self.native.get_full_ledger().await,
                Chain::Relay => self.relay.get_full_ledger().await,
                Chain::Bitcoin => self.bitcoin.get_full_ledger().await,
                Chain::Ethereum => self.ethereum.get_full_ledger().await,
            }
        };
        self.bounded(chain, call).await
    }

    pub async fn get_transaction(&self, chain: Chain, id: &str) -> AdapterResult<Transaction> {
        let call = async {
            match chain {
                Chain::Native => self.native.get_transaction(id).await,
                Chain::Relay => self.relay.get_transaction(id).await,
                Chain::Bitcoin => self.bitcoin.get_transaction(id).await,
                Chain::Ethereum => self.ethereum.get_transaction(id).await,
            }
        };
        self.bounded(chain, call).await
    }

    /// Reserve balance for `address`. Non-reserve chains answer `UnknownAddress`.
    pub async fn get_reserve_balance(&self, chain: Chain, address: &str) -> AdapterResult<f64> {
        let adapter = match chain {
            Chain::Bitcoin => &self.bitcoin,
            Chain::Ethereum => &self.ethereum,
            Chain::Native | Chain::Relay => {
                return Err(AdapterError::UnknownAddress { chain, address: address.to_string() });
            }
        };
        self.bounded(chain, adapter.get_reserve_balance(address)).await
    }

    async fn bounded<T>(&self, chain: Chain, call: impl Future<Output = AdapterResult<T>>) -> AdapterResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout {
                chain,
                millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NativeLedger, NativeTransaction};

    fn fixture_set(timeout: Duration) -> (LedgerSet, Arc<FixtureLedgerAdapter>) {
        let native = Arc::new(FixtureLedgerAdapter::new(Ledger::Native(NativeLedger {
            height: 1,
            transactions: vec![NativeTransaction {
                id: "txid_1".to_string(),
                from: "a".to_string(),
                to: "b".to_string(),
                amount: 1,
                fee: 1,
                nonce: 0,
                timestamp: 0,
            }],
        })));
        let set = LedgerSet::new(
            native.clone(),
            Arc::new(FixtureLedgerAdapter::empty(Chain::Relay)),
            Arc::new(FixtureLedgerAdapter::empty(Chain::Bitcoin).with_balance("vault", 3.0)),
            Arc::new(FixtureLedgerAdapter::empty(Chain::Ethereum)),
            timeout,
        )
        .unwrap();
        (set, native)
    }

    #[tokio::test]
    async fn test_dispatch_by_chain() {
        let (set, _) = fixture_set(Duration::from_secs(1));

        let tx = set.get_transaction(Chain::Native, "txid_1").await.unwrap();
        assert_eq!(tx.chain(), Chain::Native);
        assert_eq!(set.get_reserve_balance(Chain::Bitcoin, "vault").await.unwrap(), 3.0);
        assert!(matches!(
            set.get_reserve_balance(Chain::Native, "vault").await,
            Err(AdapterError::UnknownAddress { .. })
        ));
        assert!(matches!(
            set.get_transaction(Chain::Relay, "txid_1").await,
            Err(AdapterError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_adapter_times_out() {
        let (set, native) = fixture_set(Duration::from_millis(20));
        native.set_delay(Some(Duration::from_millis(200)));

        let err = set.get_full_ledger(Chain::Native).await.unwrap_err();
        assert_eq!(err, AdapterError::Timeout { chain: Chain::Native, millis: 20 });
        assert!(err.is_transient());
    }

    #[test]
    fn test_adapter_in_wrong_slot_is_rejected() {
        let result = LedgerSet::new(
            Arc::new(FixtureLedgerAdapter::empty(Chain::Relay)),
            Arc::new(FixtureLedgerAdapter::empty(Chain::Relay)),
            Arc::new(FixtureLedgerAdapter::empty(Chain::Bitcoin)),
            Arc::new(FixtureLedgerAdapter::empty(Chain::Ethereum)),
            Duration::from_secs(1),
        );
        let err = result.err().unwrap();
        assert!(err.to_string().contains("native slot reads from relay"));
    }
}
