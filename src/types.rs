//! Core chain-tagged types shared by the adapters and the engine.
//!
//! Every ledger and transaction is one of four closed variants. Routing is done
//! on the explicit [`Chain`] tag, never by inspecting payload shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier as it appears on the wire.
pub type TxId = String;

/// The four ledgers the sentinel observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    /// The native chain carrying the pegged unit
    Native,
    /// Inter-chain relay layer
    Relay,
    /// First reserve chain
    Bitcoin,
    /// Second reserve chain
    Ethereum,
}

impl Chain {
    /// Short tag used in alerts and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Native => "native",
            Chain::Relay => "relay",
            Chain::Bitcoin => "btc",
            Chain::Ethereum => "eth",
        }
    }

    /// Whether the chain's balance backs the pegged value.
    pub fn is_reserve(&self) -> bool {
        matches!(self, Chain::Bitcoin | Chain::Ethereum)
    }

    /// Returns all chains in fetch order.
    pub fn all() -> [Chain; 4] {
        [Chain::Native, Chain::Relay, Chain::Bitcoin, Chain::Ethereum]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer on the native chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeTransaction {
    pub id: TxId,
    pub from: String,
    pub to: String,
    /// Amount in base units
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    /// Unix timestamp (seconds)
    pub timestamp: u64,
}

/// Message carried across the relay layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayTransaction {
    pub id: TxId,
    pub source_chain: String,
    pub destination_chain: String,
    pub relayer: String,
    pub amount: u64,
    /// Confirmations on the source chain at relay time
    pub confirmations: u32,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitcoinOutput {
    pub address: String,
    pub value_sats: u64,
}

/// UTXO transaction on the Bitcoin reserve chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitcoinTransaction {
    pub id: TxId,
    /// Spent outputs, with their values
    pub inputs: Vec<BitcoinOutput>,
    pub outputs: Vec<BitcoinOutput>,
    pub confirmations: u32,
    pub timestamp: u64,
}

impl BitcoinTransaction {
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|i| i.value_sats).sum()
    }

    pub fn output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value_sats).sum()
    }

    /// Implicit fee. Zero when outputs exceed inputs.
    pub fn fee_sats(&self) -> u64 {
        self.input_value().saturating_sub(self.output_value())
    }
}

/// Account transaction on the Ethereum reserve chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthereumTransaction {
    pub id: TxId,
    pub from: String,
    /// `None` for contract creation
    pub to: Option<String>,
    pub value_wei: u128,
    pub gas_price_gwei: f64,
    pub nonce: u64,
    pub timestamp: u64,
}

/// A single transaction, tagged by the chain it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chain", content = "transaction", rename_all = "snake_case")]
pub enum Transaction {
    Native(NativeTransaction),
    Relay(RelayTransaction),
    Bitcoin(BitcoinTransaction),
    Ethereum(EthereumTransaction),
}

impl Transaction {
    pub fn chain(&self) -> Chain {
        match self {
            Transaction::Native(_) => Chain::Native,
            Transaction::Relay(_) => Chain::Relay,
            Transaction::Bitcoin(_) => Chain::Bitcoin,
            Transaction::Ethereum(_) => Chain::Ethereum,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Transaction::Native(tx) => &tx.id,
            Transaction::Relay(tx) => &tx.id,
            Transaction::Bitcoin(tx) => &tx.id,
            Transaction::Ethereum(tx) => &tx.id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NativeLedger {
    pub height: u64,
    pub transactions: Vec<NativeTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayLedger {
    pub height: u64,
    pub transactions: Vec<RelayTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BitcoinLedger {
    pub height: u64,
    pub transactions: Vec<BitcoinTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EthereumLedger {
    pub height: u64,
    pub transactions: Vec<EthereumTransaction>,
}

/// Snapshot of one chain's transaction set as of a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chain", content = "ledger", rename_all = "snake_case")]
pub enum Ledger {
    Native(NativeLedger),
    Relay(RelayLedger),
    Bitcoin(BitcoinLedger),
    Ethereum(EthereumLedger),
}

impl Ledger {
    pub fn chain(&self) -> Chain {
        match self {
            Ledger::Native(_) => Chain::Native,
            Ledger::Relay(_) => Chain::Relay,
            Ledger::Bitcoin(_) => Chain::Bitcoin,
            Ledger::Ethereum(_) => Chain::Ethereum,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Ledger::Native(l) => l.transactions.len(),
            Ledger::Relay(l) => l.transactions.len(),
            Ledger::Bitcoin(l) => l.transactions.len(),
            Ledger::Ethereum(l) => l.transactions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned, chain-tagged copies of every transaction in ledger order.
    pub fn transactions(&self) -> Vec<Transaction> {
        match self {
            Ledger::Native(l) => l.transactions.iter().cloned().map(Transaction::Native).collect(),
            Ledger::Relay(l) => l.transactions.iter().cloned().map(Transaction::Relay).collect(),
            Ledger::Bitcoin(l) => l.transactions.iter().cloned().map(Transaction::Bitcoin).collect(),
            Ledger::Ethereum(l) => l.transactions.iter().cloned().map(Transaction::Ethereum).collect(),
        }
    }

    /// Finds a transaction by id in this snapshot.
    pub fn find(&self, id: &str) -> Option<Transaction> {
        match self {
            Ledger::Native(l) => l.transactions.iter().find(|t| t.id == id).cloned().map(Transaction::Native),
            Ledger::Relay(l) => l.transactions.iter().find(|t| t.id == id).cloned().map(Transaction::Relay),
            Ledger::Bitcoin(l) => l.transactions.iter().find(|t| t.id == id).cloned().map(Transaction::Bitcoin),
            Ledger::Ethereum(l) => l.transactions.iter().find(|t| t.id == id).cloned().map(Transaction::Ethereum),
        }
    }
}
