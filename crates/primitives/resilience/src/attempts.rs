//! Per-endpoint reconnection attempt bookkeeping.
//!
//! Counts are monotonic for the lifetime of the process: they are only reset when a fresh connection to
//! the endpoint completes its handshake, never by the reconnection logic itself.
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default, Clone)]
pub struct AttemptCounter {
    attempts: HashMap<String, u64>,
}

impl AttemptCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an endpoint at zero. Existing counts are left untouched.
    pub fn ensure(&mut self, endpoint: &str) {
        if !self.attempts.contains_key(endpoint) {
            self.attempts.insert(endpoint.to_string(), 0);
        }
    }

    /// Record one failure-driven removal and return the updated count.
    pub fn increment(&mut self, endpoint: &str) -> u64 {
        let count = self.attempts.entry(endpoint.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn reset(&mut self, endpoint: &str) {
        self.attempts.insert(endpoint.to_string(), 0);
    }

    /// Current count, or `None` if the endpoint was never seen.
    pub fn get(&self, endpoint: &str) -> Option<u64> {
        self.attempts.get(endpoint).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.attempts.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}
