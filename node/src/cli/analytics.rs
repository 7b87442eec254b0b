use serde::{Deserialize, Serialize};
use std::time::Duration;
use uc_analytics::AnalyticsConfig;
use up_utils::{
    parsers::parse_duration,
    serde::{deserialize_duration, serialize_duration},
};

/// Parameters used to config analytics.
#[derive(Debug, Clone, PartialEq, clap::Args, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsParams {
    /// Name of the service.
    #[arg(env = "UPLINK_ANALYTICS_SERVICE_NAME", long, alias = "analytics", default_value = "uplink_analytics")]
    pub analytics_service_name: String,

    /// Log filter, such as `info,uc_upstream=debug`. Falls back to `RUST_LOG`, then to `info`.
    #[arg(env = "UPLINK_LOG_FILTER", long, value_name = "DIRECTIVES")]
    pub log_filter: Option<String>,

    /// Interval between two reports of the upstream pool. `0s` disables the reports.
    #[arg(env = "UPLINK_REPORT_INTERVAL", long, value_parser = parse_duration, default_value = "3s", value_name = "DURATION")]
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub report_interval: Duration,
}

impl Default for AnalyticsParams {
    fn default() -> Self {
        Self {
            analytics_service_name: "uplink_analytics".into(),
            log_filter: None,
            report_interval: Duration::from_secs(3),
        }
    }
}

impl AnalyticsParams {
    pub fn as_analytics_config(&self) -> AnalyticsConfig {
        AnalyticsConfig { service_name: self.analytics_service_name.clone(), log_filter: self.log_filter.clone() }
    }
}
