//! Per-chain fraud classification.
//!
//! Each chain variant has its own suspicion predicate. All predicates are pure
//! functions of the transaction and the configured thresholds.

use crate::sentinel::types::FraudThresholds;
use crate::types::{
    BitcoinTransaction, EthereumTransaction, NativeTransaction, RelayTransaction, Transaction,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Why a transaction was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspicionReason {
    /// Native transfer at or above the large-transfer threshold
    LargeNativeTransfer,
    /// Sender and recipient are the same account
    SelfTransfer,
    /// Non-zero native transfer paying no fee
    ZeroFee,
    /// Relayed before the source chain reached finality
    UnderConfirmedRelay,
    /// Relay whose source and destination are the same chain
    RelayLoop,
    /// Relayed amount above the cap
    RelayAmountOverCap,
    /// Outputs worth more than the inputs they spend
    ValueCreated,
    /// Fee out of proportion to the value moved
    ExcessiveFee,
    /// Many dust outputs in a single transaction
    DustFanOut,
    /// Ethereum value at or above the large-transfer threshold
    LargeEthereumTransfer,
    /// Gas price above the cap
    ExcessiveGasPrice,
    /// Contract creation carrying value
    ValueBearingContractCreation,
}

impl SuspicionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspicionReason::LargeNativeTransfer => "large_native_transfer",
            SuspicionReason::SelfTransfer => "self_transfer",
            SuspicionReason::ZeroFee => "zero_fee",
            SuspicionReason::UnderConfirmedRelay => "under_confirmed_relay",
            SuspicionReason::RelayLoop => "relay_loop",
            SuspicionReason::RelayAmountOverCap => "relay_amount_over_cap",
            SuspicionReason::ValueCreated => "value_created",
            SuspicionReason::ExcessiveFee => "excessive_fee",
            SuspicionReason::DustFanOut => "dust_fan_out",
            SuspicionReason::LargeEthereumTransfer => "large_ethereum_transfer",
            SuspicionReason::ExcessiveGasPrice => "excessive_gas_price",
            SuspicionReason::ValueBearingContractCreation => "value_bearing_contract_creation",
        }
    }
}

/// Suspicion predicates for all four chains.
#[derive(Debug, Clone, Default)]
pub struct FraudClassifier {
    thresholds: FraudThresholds,
}

impl FraudClassifier {
    pub fn new(thresholds: FraudThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &FraudThresholds {
        &self.thresholds
    }

    /// True when the transaction should be flagged.
    ///
    /// The sweep gates on this and only gathers [`suspicion_reasons`](Self::suspicion_reasons)
    /// for flagged transactions; a single lookup needs the reasons either way.
    pub fn classify(&self, tx: &Transaction) -> bool {
        !self.suspicion_reasons(tx).is_empty()
    }

    /// Every reason the transaction looks suspicious; empty when clean.
    pub fn suspicion_reasons(&self, tx: &Transaction) -> Vec<SuspicionReason> {
        let reasons = match tx {
            Transaction::Native(tx) => self.check_native(tx),
            Transaction::Relay(tx) => self.check_relay(tx),
            Transaction::Bitcoin(tx) => self.check_bitcoin(tx),
            Transaction::Ethereum(tx) => self.check_ethereum(tx),
        };
        if !reasons.is_empty() {
            debug!("{} transaction {} matched {:?}", tx.chain(), tx.id(), reasons);
        }
        reasons
    }

    fn check_native(&self, tx: &NativeTransaction) -> Vec<SuspicionReason> {
        let mut reasons = Vec::new();
        if tx.amount >= self.thresholds.native_large_transfer {
            reasons.push(SuspicionReason::LargeNativeTransfer);
        }
        if tx.amount > 0 && tx.from == tx.to {
            reasons.push(SuspicionReason::SelfTransfer);
        }
        if tx.amount > 0 && tx.fee == 0 {
            reasons.push(SuspicionReason::ZeroFee);
        }
        reasons
    }

    fn check_relay(&self, tx: &RelayTransaction) -> Vec<SuspicionReason> {
        let mut reasons = Vec::new();
        if tx.confirmations < self.thresholds.relay_min_confirmations {
            reasons.push(SuspicionReason::UnderConfirmedRelay);
        }
        if tx.source_chain == tx.destination_chain {
            reasons.push(SuspicionReason::RelayLoop);
        }
        if tx.amount > self.thresholds.relay_max_amount {
            reasons.push(SuspicionReason::RelayAmountOverCap);
        }
        reasons
    }

    fn check_bitcoin(&self, tx: &BitcoinTransaction) -> Vec<SuspicionReason> {
        let mut reasons = Vec::new();
        let input_value = tx.input_value();

        // Coinbase-style transactions carry no inputs and are not checked for value creation.
        if !tx.inputs.is_empty() && tx.output_value() > input_value {
            reasons.push(SuspicionReason::ValueCreated);
        }

        if input_value > 0 {
            let fee_ratio = tx.fee_sats() as f64 / input_value as f64;
            if fee_ratio > self.thresholds.bitcoin_max_fee_ratio {
                reasons.push(SuspicionReason::ExcessiveFee);
            }
        }

        let dust_outputs = tx
            .outputs
            .iter()
            .filter(|o| o.value_sats < self.thresholds.bitcoin_dust_limit_sats)
            .count();
        if dust_outputs >= self.thresholds.bitcoin_dust_fanout {
            reasons.push(SuspicionReason::DustFanOut);
        }

        reasons
    }

    fn check_ethereum(&self, tx: &EthereumTransaction) -> Vec<SuspicionReason> {
        let mut reasons = Vec::new();
        if tx.value_wei >= self.thresholds.ethereum_large_transfer_wei {
            reasons.push(SuspicionReason::LargeEthereumTransfer);
        }
        if tx.gas_price_gwei > self.thresholds.ethereum_max_gas_price_gwei {
            reasons.push(SuspicionReason::ExcessiveGasPrice);
        }
        if tx.to.is_none() && tx.value_wei > 0 {
            reasons.push(SuspicionReason::ValueBearingContractCreation);
        }
        reasons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BitcoinOutput;

    fn native(amount: u64, fee: u64, to: &str) -> Transaction {
        Transaction::Native(NativeTransaction {
            id: "txid_test".to_string(),
            from: "alice".to_string(),
            to: to.to_string(),
            amount,
            fee,
            nonce: 1,
            timestamp: 0,
        })
    }

    fn relay(confirmations: u32, source: &str, destination: &str, amount: u64) -> Transaction {
        Transaction::Relay(RelayTransaction {
            id: "relay_test".to_string(),
            source_chain: source.to_string(),
            destination_chain: destination.to_string(),
            relayer: "relayer-1".to_string(),
            amount,
            confirmations,
            timestamp: 0,
        })
    }

    fn output(value_sats: u64) -> BitcoinOutput {
        BitcoinOutput { address: "bc1qexample".to_string(), value_sats }
    }

    #[test]
    fn test_clean_native_transfer() {
        let classifier = FraudClassifier::default();
        assert!(!classifier.classify(&native(1_000, 10, "bob")));
    }

    #[test]
    fn test_native_reasons() {
        let classifier = FraudClassifier::default();
        let reasons = classifier.suspicion_reasons(&native(2_000_000_000, 0, "alice"));
        assert_eq!(
            reasons,
            vec![
                SuspicionReason::LargeNativeTransfer,
                SuspicionReason::SelfTransfer,
                SuspicionReason::ZeroFee,
            ]
        );
    }

    #[test]
    fn test_zero_amount_self_transfer_is_clean() {
        let classifier = FraudClassifier::default();
        assert!(!classifier.classify(&native(0, 0, "alice")));
    }

    #[test]
    fn test_relay_checks() {
        let classifier = FraudClassifier::default();
        assert!(!classifier.classify(&relay(12, "native", "eth", 100)));
        assert_eq!(
            classifier.suspicion_reasons(&relay(2, "native", "native", 100)),
            vec![SuspicionReason::UnderConfirmedRelay, SuspicionReason::RelayLoop]
        );
        assert_eq!(
            classifier.suspicion_reasons(&relay(12, "native", "btc", 600_000_000)),
            vec![SuspicionReason::RelayAmountOverCap]
        );
    }

    #[test]
    fn test_bitcoin_value_created() {
        let classifier = FraudClassifier::default();
        let tx = Transaction::Bitcoin(BitcoinTransaction {
            id: "btc_1".to_string(),
            inputs: vec![output(10_000)],
            outputs: vec![output(20_000)],
            confirmations: 3,
            timestamp: 0,
        });
        assert_eq!(classifier.suspicion_reasons(&tx), vec![SuspicionReason::ValueCreated]);
    }

    #[test]
    fn test_bitcoin_excessive_fee_and_dust() {
        let classifier = FraudClassifier::default();
        let tx = Transaction::Bitcoin(BitcoinTransaction {
            id: "btc_2".to_string(),
            inputs: vec![output(100_000)],
            outputs: vec![output(50_000)],
            confirmations: 3,
            timestamp: 0,
        });
        assert_eq!(classifier.suspicion_reasons(&tx), vec![SuspicionReason::ExcessiveFee]);

        let fanout = Transaction::Bitcoin(BitcoinTransaction {
            id: "btc_3".to_string(),
            inputs: vec![output(10_000)],
            outputs: (0..10).map(|_| output(500)).chain(std::iter::once(output(4_900))).collect(),
            confirmations: 3,
            timestamp: 0,
        });
        assert_eq!(classifier.suspicion_reasons(&fanout), vec![SuspicionReason::DustFanOut]);
    }

    #[test]
    fn test_bitcoin_coinbase_not_value_created() {
        let classifier = FraudClassifier::default();
        let tx = Transaction::Bitcoin(BitcoinTransaction {
            id: "btc_coinbase".to_string(),
            inputs: vec![],
            outputs: vec![output(625_000_000)],
            confirmations: 100,
            timestamp: 0,
        });
        assert!(!classifier.classify(&tx));
    }

    #[test]
    fn test_ethereum_checks() {
        let classifier = FraudClassifier::default();
        let clean = Transaction::Ethereum(EthereumTransaction {
            id: "0xabc".to_string(),
            from: "0xfrom".to_string(),
            to: Some("0xto".to_string()),
            value_wei: 1_000_000_000_000_000_000,
            gas_price_gwei: 30.0,
            nonce: 4,
            timestamp: 0,
        });
        assert!(!classifier.classify(&clean));

        let creation = Transaction::Ethereum(EthereumTransaction {
            id: "0xdef".to_string(),
            from: "0xfrom".to_string(),
            to: None,
            value_wei: 5,
            gas_price_gwei: 5_000.0,
            nonce: 5,
            timestamp: 0,
        });
        assert_eq!(
            classifier.suspicion_reasons(&creation),
            vec![
                SuspicionReason::ExcessiveGasPrice,
                SuspicionReason::ValueBearingContractCreation,
            ]
        );
    }
}
