use crate::{link::Metadata, registry::PoolEvent, role::Role, UpstreamRegistry};
use std::sync::Weak;
use tokio::sync::mpsc;
use up_resilience::BackoffConfig;

/// A link detached from the pool after a failure.
#[derive(Debug, Clone)]
pub(crate) struct Removal {
    pub endpoint: String,
    pub role: Role,
    pub metadata: Metadata,
    /// Attempt count of the endpoint, this removal included.
    pub attempt: u64,
    /// Administrative removals of the endpoint seen so far.
    pub generation: u64,
}

/// Dials endpoints again after their links have been removed from the pool.
///
/// The delay only depends on the attempt count of the endpoint. The scheduler never resets that count: only a
/// fresh link completing its handshake does.
pub struct ReconnectScheduler {
    registry: Weak<UpstreamRegistry>,
    backoff: BackoffConfig,
    removals: mpsc::UnboundedReceiver<Removal>,
}

impl ReconnectScheduler {
    pub(crate) fn new(
        registry: Weak<UpstreamRegistry>,
        backoff: BackoffConfig,
        removals: mpsc::UnboundedReceiver<Removal>,
    ) -> Self {
        Self { registry, backoff, removals }
    }

    pub async fn run(mut self) {
        while let Some(removal) = self.removals.recv().await {
            let Some(registry) = self.registry.upgrade() else { return };
            self.schedule(&registry, removal);
        }
    }

    fn schedule(&self, registry: &UpstreamRegistry, removal: Removal) {
        let Removal { endpoint, role, metadata, attempt, generation } = removal;
        let Some(token) = registry.reconnect_token(&endpoint, generation) else {
            tracing::debug!(endpoint = %endpoint, "Not reconnecting, upstream taken out of rotation");
            return;
        };
        let delay = self.backoff.delay_for(attempt);

        tracing::info!(
            endpoint = %endpoint,
            %role,
            attempt,
            phase = %self.backoff.phase_for(attempt),
            "🔄 Reconnecting in {delay:?}"
        );
        registry.notify(PoolEvent::ReconnectScheduled { endpoint: endpoint.clone(), role, attempt, delay });

        let registry = self.registry.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!(endpoint = %endpoint, "Pending reconnection cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if let Some(registry) = registry.upgrade() {
                        registry.add(endpoint, role, metadata);
                    }
                }
            }
        });
    }
}
