/// Resilience primitives for keeping a pool of upstream connections alive.
///
/// This crate provides the bookkeeping used by the upstream registry when a connection drops:
///
/// - **Attempt Counting**: per-endpoint count of consecutive failure-driven removals
/// - **Tiered Backoff**: reconnection delay picked from a fixed ladder of tiers
///
/// # Example
///
/// ```rust
/// use up_resilience::{AttemptCounter, BackoffConfig};
/// use std::time::Duration;
///
/// let backoff = BackoffConfig::default();
/// let mut attempts = AttemptCounter::new();
///
/// attempts.ensure("wss://xrplcluster.com");
/// let attempt = attempts.increment("wss://xrplcluster.com");
/// assert_eq!(backoff.delay_for(attempt), Duration::from_secs(1));
/// ```
pub mod attempts;
pub mod backoff;

pub use attempts::AttemptCounter;
pub use backoff::{BackoffConfig, BackoffPhase, BackoffTier};
