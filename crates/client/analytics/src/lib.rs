//! Logging setup of the Uplink node.
//!
//! Events are written to stdout through [`CustomFormatter`]. Link state changes, logged under the
//! `upstream_state` target, get a compact line of their own.

use formatter::CustomFormatter;
use tracing_core::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

mod formatter;

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub service_name: String,
    /// Filter directives, in the `RUST_LOG` syntax. `RUST_LOG` is used when unset.
    pub log_filter: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { service_name: "Uplink".into(), log_filter: None }
    }
}

pub struct AnalyticsService {
    config: AnalyticsConfig,
}

impl AnalyticsService {
    pub fn new(config: AnalyticsConfig) -> anyhow::Result<Self> {
        // Fail early on bad directives, before anything has been installed.
        Self::env_filter(&config)?;
        Ok(Self { config })
    }

    fn env_filter(config: &AnalyticsConfig) -> anyhow::Result<EnvFilter> {
        let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
        Ok(match &config.log_filter {
            Some(directives) => builder.parse(directives)?,
            None => builder.from_env()?,
        })
    }

    /// Installs the global subscriber. Can only be called once per process.
    pub fn setup(&self) -> anyhow::Result<()> {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().event_format(CustomFormatter::new()))
            .with(Self::env_filter(&self.config)?)
            .try_init()?;

        tracing::debug!(service = %self.config.service_name, "Logging initialized");
        Ok(())
    }
}
