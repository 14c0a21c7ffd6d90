//! Input router.
//!
//! Every submitted string is recorded in recent-activity memory first. The
//! string is then matched against an ordered list of prefix rules; the first
//! match decides which chain resolves and classifies it. Unmatched input is
//! recorded and otherwise ignored.

use crate::sentinel::engine::{SharedSentinel, Verdict};
use crate::sentinel::error::SentinelResult;
use crate::sentinel::metrics::INPUTS_UNRECOGNIZED;
use crate::types::Chain;
use nonempty::{nonempty, NonEmpty};
use tracing::{debug, instrument};

/// Maps identifiers starting with `prefix` to `chain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRule {
    pub prefix: String,
    pub chain: Chain,
}

impl PrefixRule {
    pub fn new(prefix: impl Into<String>, chain: Chain) -> Self {
        Self { prefix: prefix.into(), chain }
    }

    fn matches(&self, input: &str) -> bool {
        input.starts_with(&self.prefix)
    }
}

/// Built-in rules, chain-specific prefixes before the generic ones.
///
/// `btc_txid_…` and `eth_txid_…` must be matched before the bare `txid` rule.
pub fn default_rules() -> NonEmpty<PrefixRule> {
    nonempty![
        PrefixRule::new("btc_", Chain::Bitcoin),
        PrefixRule::new("eth_", Chain::Ethereum),
        PrefixRule::new("0x", Chain::Ethereum),
        PrefixRule::new("relay_", Chain::Relay),
        PrefixRule::new("rly_", Chain::Relay),
        PrefixRule::new("ibc", Chain::Relay),
        PrefixRule::new("txid", Chain::Native),
        PrefixRule::new("tx_", Chain::Native)
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// No rule matched; the input was only recorded
    Unrecognized,
    Checked(Verdict),
}

/// Routes free-text input to single-transaction lookups.
#[derive(Clone)]
pub struct InputRouter {
    sentinel: SharedSentinel,
    rules: NonEmpty<PrefixRule>,
}

impl InputRouter {
    pub fn new(sentinel: SharedSentinel) -> Self {
        Self::with_rules(sentinel, default_rules())
    }

    /// Rules are tried in order; put overlapping, more specific prefixes first.
    pub fn with_rules(sentinel: SharedSentinel, rules: NonEmpty<PrefixRule>) -> Self {
        Self { sentinel, rules }
    }

    pub fn rules(&self) -> &NonEmpty<PrefixRule> {
        &self.rules
    }

    pub fn route(&self, input: &str) -> Option<Chain> {
        self.rules.iter().find(|rule| rule.matches(input)).map(|rule| rule.chain)
    }

    /// Records `input`, then looks it up and classifies it if a rule matches.
    ///
    /// A failed lookup is returned as [`SentinelError::LookupFailure`](crate::sentinel::error::SentinelError::LookupFailure);
    /// the input stays recorded either way.
    #[instrument(skip(self))]
    pub async fn submit(&self, input: &str) -> SentinelResult<SubmitOutcome> {
        self.sentinel.record_input(input).await;

        let Some(chain) = self.route(input) else {
            debug!("No route for input {:?}", input);
            self.sentinel.metrics().increment_counter(INPUTS_UNRECOGNIZED).await;
            return Ok(SubmitOutcome::Unrecognized);
        };

        let verdict = self.sentinel.check_transaction(input, chain).await?;
        Ok(SubmitOutcome::Checked(verdict))
    }
}
