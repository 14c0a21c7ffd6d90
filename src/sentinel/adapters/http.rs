//! HTTP gateway adapter.
//!
//! Talks to a JSON gateway exposing `GET {base}/ledger`,
//! `GET {base}/transactions/{id}` and `GET {base}/balances/{address}`.
//! Ids and addresses are sent as single percent-encoded path segments.
//! Transient failures are retried with exponential backoff, requests are paced
//! by a rate limiter, and resolved transactions are cached for a short TTL.

use crate::sentinel::adapters::{AdapterResult, LedgerAdapter, ReserveAdapter};
use crate::sentinel::error::AdapterError;
use crate::sentinel::types::SentinelConfig;
use crate::types::{
    BitcoinLedger, BitcoinTransaction, Chain, EthereumLedger, EthereumTransaction, Ledger,
    NativeLedger, NativeTransaction, RelayLedger, RelayTransaction, Transaction,
};
use anyhow::{bail, Context};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use moka::future::Cache;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::ExponentialBackoff, RetryIf};
use tracing::{debug, instrument, warn};

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: f64,
}

/// What a 404 means for the request being made.
enum Missing<'a> {
    Transaction(&'a str),
    Address(&'a str),
    Ledger,
}

/// Ledger adapter for one chain behind an HTTP gateway.
pub struct HttpLedgerAdapter {
    chain: Chain,
    base_url: Url,
    client: Client,
    retry_attempts: usize,
    limiter: Arc<DefaultDirectRateLimiter>,
    lookup_cache: Cache<String, Transaction>,
}

impl HttpLedgerAdapter {
    pub fn new(
        chain: Chain,
        base_url: impl Into<String>,
        client: Client,
        config: &SentinelConfig,
    ) -> anyhow::Result<Self> {
        let raw = base_url.into();
        let base_url = Url::parse(&raw).with_context(|| format!("Invalid {} gateway URL {:?}", chain, raw))?;
        if base_url.cannot_be_a_base() {
            bail!("{} gateway URL {:?} cannot carry a path", chain, raw);
        }

        let per_second = NonZeroU32::new(config.adapter_rate_limit_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        let lookup_cache = Cache::builder()
            .max_capacity(config.lookup_cache_max_entries)
            .time_to_live(Duration::from_secs(config.lookup_cache_ttl_seconds))
            .build();

        Ok(Self {
            chain,
            base_url,
            client,
            retry_attempts: config.adapter_retry_attempts,
            limiter,
            lookup_cache,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends `segments` to the base path, encoding `/`, `?`, `#` and `%` in each.
    fn url_for(&self, segments: &[&str]) -> AdapterResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AdapterError::Unavailable {
                chain: self.chain,
                reason: format!("gateway URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json_with_retries(&self, segments: &[&str], missing: Missing<'_>) -> AdapterResult<Value> {
        let url = self.url_for(segments)?;
        let retry_strategy = ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(5))
            .take(self.retry_attempts);

        RetryIf::spawn(
            retry_strategy,
            || self.get_json(&url, &missing),
            |e: &AdapterError| e.is_transient(),
        )
        .await
    }

    async fn get_json(&self, url: &Url, missing: &Missing<'_>) -> AdapterResult<Value> {
        self.limiter.until_ready().await;

        let response = self.client.get(url.clone()).send().await.map_err(|e| AdapterError::Unavailable {
            chain: self.chain,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(match missing {
                Missing::Transaction(id) => AdapterError::NotFound { chain: self.chain, id: id.to_string() },
                Missing::Address(address) => AdapterError::UnknownAddress {
                    chain: self.chain,
                    address: address.to_string(),
                },
                Missing::Ledger => AdapterError::Unavailable {
                    chain: self.chain,
                    reason: format!("{} returned 404", url),
                },
            });
        }
        if !status.is_success() {
            warn!("{} gateway returned {} for {}", self.chain, status, url);
            return Err(AdapterError::Unavailable {
                chain: self.chain,
                reason: format!("HTTP {}", status),
            });
        }

        response.json::<Value>().await.map_err(|e| AdapterError::Decode {
            chain: self.chain,
            reason: e.to_string(),
        })
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, value: Value) -> AdapterResult<T> {
        serde_json::from_value(value).map_err(|e| AdapterError::Decode {
            chain: self.chain,
            reason: e.to_string(),
        })
    }

    fn decode_ledger(&self, value: Value) -> AdapterResult<Ledger> {
        Ok(match self.chain {
            Chain::Native => Ledger::Native(self.decode::<NativeLedger>(value)?),
            Chain::Relay => Ledger::Relay(self.decode::<RelayLedger>(value)?),
            Chain::Bitcoin => Ledger::Bitcoin(self.decode::<BitcoinLedger>(value)?),
            Chain::Ethereum => Ledger::Ethereum(self.decode::<EthereumLedger>(value)?),
        })
    }

    fn decode_transaction(&self, value: Value) -> AdapterResult<Transaction> {
        Ok(match self.chain {
            Chain::Native => Transaction::Native(self.decode::<NativeTransaction>(value)?),
            Chain::Relay => Transaction::Relay(self.decode::<RelayTransaction>(value)?),
            Chain::Bitcoin => Transaction::Bitcoin(self.decode::<BitcoinTransaction>(value)?),
            Chain::Ethereum => Transaction::Ethereum(self.decode::<EthereumTransaction>(value)?),
        })
    }
}

#[async_trait]
impl LedgerAdapter for HttpLedgerAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    #[instrument(skip(self), fields(chain = %self.chain))]
    async fn get_full_ledger(&self) -> AdapterResult<Ledger> {
        let value = self.get_json_with_retries(&["ledger"], Missing::Ledger).await?;
        let ledger = self.decode_ledger(value)?;
        debug!("Fetched {} ledger with {} transactions", self.chain, ledger.len());
        Ok(ledger)
    }

    #[instrument(skip(self), fields(chain = %self.chain))]
    async fn get_transaction(&self, id: &str) -> AdapterResult<Transaction> {
        if let Some(tx) = self.lookup_cache.get(id).await {
            debug!("Lookup cache hit for {}", id);
            return Ok(tx);
        }

        let value = self
            .get_json_with_retries(&["transactions", id], Missing::Transaction(id))
            .await?;
        let tx = self.decode_transaction(value)?;
        self.lookup_cache.insert(id.to_string(), tx.clone()).await;
        Ok(tx)
    }
}

#[async_trait]
impl ReserveAdapter for HttpLedgerAdapter {
    #[instrument(skip(self), fields(chain = %self.chain))]
    async fn get_reserve_balance(&self, address: &str) -> AdapterResult<f64> {
        let value = self
            .get_json_with_retries(&["balances", address], Missing::Address(address))
            .await?;
        let response: BalanceResponse = self.decode(value)?;
        Ok(response.balance)
    }
}
