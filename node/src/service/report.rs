use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior};
use uc_upstream::{PoolReport, UpstreamRegistry};
use up_utils::service::ServiceContext;

/// Periodically logs the reconnection attempts of every endpoint and the upstreams which are alive.
pub struct PoolReporter {
    registry: Arc<UpstreamRegistry>,
    interval: Duration,
}

impl PoolReporter {
    pub fn new(registry: Arc<UpstreamRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub async fn run(self, ctx: ServiceContext) {
        if self.interval.is_zero() {
            tracing::debug!("Pool reports are disabled");
            return;
        }

        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while ctx.run_until_cancelled(interval.tick()).await.is_some() {
            self.report();
        }
    }

    pub fn report(&self) -> PoolReport {
        let report = self.registry.snapshot();

        let attempts = report
            .attempts
            .iter()
            .map(|(endpoint, attempts)| format!("{endpoint}: {attempts}"))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("📊 Reconnection attempts: [{attempts}]");

        let mut alive = 0;
        for link in report.alive() {
            alive += 1;
            tracing::info!(
                "🟢 {} {} pings={} metadata={}",
                link.endpoint,
                link.role,
                link.unanswered_pings,
                serde_json::Value::Object(link.metadata.clone())
            );
        }
        if alive < report.links.len() {
            tracing::info!("⏳ {}/{} upstreams alive", alive, report.links.len());
        }

        report
    }
}
