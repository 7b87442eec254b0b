//! Uplink node command line.
#![warn(missing_docs)]

mod cli;
mod service;

use anyhow::Context;
use clap::Parser;
use cli::RunCmd;
use service::PoolReporter;
use std::sync::Arc;
use uc_analytics::AnalyticsService;
use uc_upstream::{Metadata, RegistryConfig, UpstreamRegistry, WsConnector};
use up_utils::{
    service::{cancel_on_shutdown_signal, ServiceContext},
    AbortOnDrop,
};

const GREET_IMPL_NAME: &str = "Uplink";
const GREET_SUPPORT_URL: &str = "https://github.com/uplink-pool/uplink/issues";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let run_cmd = RunCmd::parse().into_config().context("Loading configuration")?;

    // Setting up analytics

    let analytics = AnalyticsService::new(run_cmd.analytics_params.as_analytics_config())
        .context("Initializing analytics service")?;
    analytics.setup()?;

    tracing::info!("🔗 {} Node", GREET_IMPL_NAME);
    tracing::info!("✌️  Version {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("💁 Support URL: {}", GREET_SUPPORT_URL);

    // ===================================================================== //
    //                             SERVICES (SETUP)                          //
    // ===================================================================== //

    let registry = UpstreamRegistry::start(
        RegistryConfig::default().link_options(run_cmd.upstream_params.link_options()),
        Arc::new(WsConnector),
    );

    for seed in run_cmd.upstream_params.seeds() {
        tracing::info!("🌐 Upstream: {} ({})", seed.endpoint, seed.role);
        registry.add(seed.endpoint, seed.role, Metadata::new());
    }

    // ===================================================================== //
    //                             SERVICES (START)                          //
    // ===================================================================== //

    let ctx = ServiceContext::new();
    let reporter = PoolReporter::new(Arc::clone(&registry), run_cmd.analytics_params.report_interval);
    let reporter = AbortOnDrop::spawn(reporter.run(ctx.child()));

    cancel_on_shutdown_signal(ctx.clone()).await.context("Waiting for a shutdown signal")?;

    registry.shutdown();
    reporter.await;

    Ok(())
}
