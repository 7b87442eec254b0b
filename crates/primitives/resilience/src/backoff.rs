/// Tiered reconnection backoff for upstream connections.
///
/// The delay before re-dialing an endpoint only depends on how many times in a row
/// that endpoint has been dropped from the pool:
///
/// - **Fast**: fewer than 10 attempts - one second, quick recovery for temporary blips
/// - **Slow**: fewer than 30 attempts - five seconds
/// - **Sparse**: fewer than 100 attempts - half a minute
/// - **Dormant**: 100 attempts and more - five minutes, the endpoint has been offline for a long time
///
/// Endpoints are never abandoned, they only get retried less often.
use std::time::Duration;

/// One step of the backoff ladder: attempts strictly below `below` wait `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffTier {
    pub below: u64,
    pub delay: Duration,
}

/// Configuration for the tiered backoff strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Tiers, evaluated in order. The first tier whose bound is above the attempt count wins.
    pub tiers: Vec<BackoffTier>,
    /// Delay used once the attempt count is past every tier.
    pub ceiling: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                BackoffTier { below: 10, delay: Duration::from_secs(1) },
                BackoffTier { below: 30, delay: Duration::from_secs(5) },
                BackoffTier { below: 100, delay: Duration::from_secs(30) },
            ],
            ceiling: Duration::from_secs(5 * 60), // 5 minutes
        }
    }
}

/// Name of the backoff tier an endpoint currently sits in. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPhase {
    Fast,
    Slow,
    Sparse,
    Dormant,
}

impl std::fmt::Display for BackoffPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Slow => write!(f, "slow"),
            Self::Sparse => write!(f, "sparse"),
            Self::Dormant => write!(f, "dormant"),
        }
    }
}

impl BackoffConfig {
    /// Delay to wait before reconnecting an endpoint that has been removed `attempt` times.
    pub fn delay_for(&self, attempt: u64) -> Duration {
        self.tiers.iter().find(|tier| attempt < tier.below).map(|tier| tier.delay).unwrap_or(self.ceiling)
    }

    /// Determine the current phase based on the attempt count
    pub fn phase_for(&self, attempt: u64) -> BackoffPhase {
        match self.tiers.iter().position(|tier| attempt < tier.below) {
            Some(0) => BackoffPhase::Fast,
            Some(1) => BackoffPhase::Slow,
            Some(_) => BackoffPhase::Sparse,
            None => BackoffPhase::Dormant,
        }
    }
}
