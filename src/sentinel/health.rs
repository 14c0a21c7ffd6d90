//! Per-chain adapter health tracking.
//!
//! A small circuit breaker: chains that keep failing are degraded, then put in
//! cooldown so integrity cycles stop hammering them, and are re-admitted once
//! the cooldown expires.

use crate::types::Chain;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Success rate below which a degraded chain enters cooldown.
const MIN_SUCCESS_RATE: f64 = 0.3;
/// Success rate above which a degraded chain recovers.
const RECOVERY_SUCCESS_RATE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Healthy,
    /// Failing but still polled
    Degraded,
    /// Skipped until the cooldown expires
    CoolingDown,
}

#[derive(Debug, Clone)]
struct ChainHealth {
    state: ChainState,
    consecutive_failures: u32,
    recent_attempts: VecDeque<bool>,
    cooldown_start: Option<Instant>,
}

impl ChainHealth {
    fn new() -> Self {
        Self {
            state: ChainState::Healthy,
            consecutive_failures: 0,
            recent_attempts: VecDeque::new(),
            cooldown_start: None,
        }
    }

    fn push_attempt(&mut self, success: bool, sample_size: usize) {
        self.recent_attempts.push_back(success);
        while self.recent_attempts.len() > sample_size.max(1) {
            self.recent_attempts.pop_front();
        }
    }

    fn success_rate(&self) -> f64 {
        if self.recent_attempts.is_empty() {
            return 1.0;
        }
        let successes = self.recent_attempts.iter().filter(|&&ok| ok).count();
        successes as f64 / self.recent_attempts.len() as f64
    }
}

/// Snapshot of a chain's health for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainHealthStats {
    pub state: ChainState,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub attempts: usize,
}

/// Health of every chain adapter.
#[derive(Debug)]
pub struct ChainHealthTracker {
    chains: HashMap<Chain, ChainHealth>,
    failure_threshold: u32,
    cooldown: Duration,
    sample_size: usize,
}

impl ChainHealthTracker {
    pub fn new(failure_threshold: u32, cooldown_seconds: u64, sample_size: usize) -> Self {
        Self {
            chains: HashMap::new(),
            failure_threshold: failure_threshold.max(1),
            cooldown: Duration::from_secs(cooldown_seconds),
            sample_size,
        }
    }

    pub fn record_success(&mut self, chain: Chain) {
        let sample_size = self.sample_size;
        let health = self.chains.entry(chain).or_insert_with(ChainHealth::new);
        health.consecutive_failures = 0;
        health.push_attempt(true, sample_size);
        self.update_state(chain);
    }

    pub fn record_failure(&mut self, chain: Chain) {
        let sample_size = self.sample_size;
        let health = self.chains.entry(chain).or_insert_with(ChainHealth::new);
        health.consecutive_failures += 1;
        health.push_attempt(false, sample_size);
        self.update_state(chain);
        debug!("{} failure recorded, state {:?}", chain, self.state(chain));
    }

    /// Whether the chain should be polled now. Expired cooldowns re-admit the chain as degraded.
    pub fn is_available(&mut self, chain: Chain) -> bool {
        let cooldown = self.cooldown;
        let health = self.chains.entry(chain).or_insert_with(ChainHealth::new);
        match health.state {
            ChainState::Healthy | ChainState::Degraded => true,
            ChainState::CoolingDown => match health.cooldown_start {
                Some(start) if start.elapsed() < cooldown => false,
                _ => {
                    health.state = ChainState::Degraded;
                    health.cooldown_start = None;
                    health.consecutive_failures = 0;
                    info!("{} cooldown expired, polling again", chain);
                    true
                }
            },
        }
    }

    pub fn state(&self, chain: Chain) -> ChainState {
        self.chains.get(&chain).map(|h| h.state).unwrap_or(ChainState::Healthy)
    }

    pub fn stats(&self) -> HashMap<Chain, ChainHealthStats> {
        self.chains
            .iter()
            .map(|(chain, health)| {
                (
                    *chain,
                    ChainHealthStats {
                        state: health.state,
                        consecutive_failures: health.consecutive_failures,
                        success_rate: health.success_rate(),
                        attempts: health.recent_attempts.len(),
                    },
                )
            })
            .collect()
    }

    fn update_state(&mut self, chain: Chain) {
        let threshold = self.failure_threshold;
        let sample_size = self.sample_size;
        let Some(health) = self.chains.get_mut(&chain) else {
            return;
        };

        match health.state {
            ChainState::Healthy => {
                if health.consecutive_failures >= threshold {
                    health.state = ChainState::Degraded;
                    warn!("{} degraded after {} consecutive failures", chain, health.consecutive_failures);
                }
            }
            ChainState::Degraded => {
                let rate = health.success_rate();
                if health.consecutive_failures >= threshold * 2
                    || (health.recent_attempts.len() >= sample_size && rate < MIN_SUCCESS_RATE)
                {
                    health.state = ChainState::CoolingDown;
                    health.cooldown_start = Some(Instant::now());
                    warn!(
                        "{} entering cooldown: {} consecutive failures, {:.0}% success rate",
                        chain,
                        health.consecutive_failures,
                        rate * 100.0
                    );
                } else if health.consecutive_failures == 0 && rate > RECOVERY_SUCCESS_RATE {
                    health.state = ChainState::Healthy;
                    info!("{} recovered", chain);
                }
            }
            ChainState::CoolingDown => {}
        }
    }
}
