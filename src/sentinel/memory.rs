//! Recent-activity memory.
//!
//! A bounded FIFO of the most recent raw inputs plus an unbounded frequency
//! map. Eviction from the FIFO never touches the frequency history.

use std::collections::{HashMap, VecDeque};

/// Short-term buffer and long-term frequency counts over submitted inputs.
#[derive(Debug, Clone)]
pub struct RecentActivityMemory {
    recent: VecDeque<String>,
    capacity: usize,
    // TODO: bound this map with a retention policy once an eviction window is agreed on.
    frequency: HashMap<String, u64>,
}

impl RecentActivityMemory {
    /// Creates an empty memory. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recent: VecDeque::with_capacity(capacity),
            capacity,
            frequency: HashMap::new(),
        }
    }

    /// Appends `input`, evicting the oldest entry when full, and bumps its count.
    pub fn record(&mut self, input: &str) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(input.to_string());
        *self.frequency.entry(input.to_string()).or_insert(0) += 1;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Recent inputs, oldest first.
    pub fn recent(&self) -> Vec<String> {
        self.recent.iter().cloned().collect()
    }

    /// Number of times `input` was ever recorded.
    pub fn count(&self, input: &str) -> u64 {
        self.frequency.get(input).copied().unwrap_or(0)
    }

    /// Number of distinct inputs ever recorded.
    pub fn distinct_inputs(&self) -> usize {
        self.frequency.len()
    }

    /// Recent inputs containing `query`, newest first.
    pub fn search(&self, query: &str) -> Vec<String> {
        self.recent
            .iter()
            .rev()
            .filter(|input| input.contains(query))
            .cloned()
            .collect()
    }

    /// The `n` most frequently recorded inputs. Ties break lexicographically.
    pub fn most_frequent(&self, n: usize) -> Vec<(String, u64)> {
        let mut ranked: Vec<(String, u64)> = self
            .frequency
            .iter()
            .map(|(input, count)| (input.clone(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}
