pub mod analytics;
pub mod upstream;

pub use analytics::AnalyticsParams;
pub use upstream::UpstreamParams;

use anyhow::bail;
use clap::Parser;
use figment::{
    providers::{Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, PartialEq, Parser, Deserialize, Serialize)]
#[clap(name = "uplink", version, about)]
#[serde(default)]
pub struct RunCmd {
    /// Load the configuration from a `.json`, `.toml` or `.yaml` file instead of the command line.
    #[arg(env = "UPLINK_CONFIG_FILE", long, value_name = "PATH")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub analytics_params: AnalyticsParams,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub upstream_params: UpstreamParams,
}

impl RunCmd {
    /// Resolves the final configuration. A config file replaces the command line values.
    pub fn into_config(self) -> anyhow::Result<Self> {
        let config = Figment::new();
        let config = match self.config_file.as_deref() {
            Some(path) => match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => config.merge(Toml::file(path)),
                Some("json") => config.merge(Json::file(path)),
                Some("yaml") | Some("yml") => config.merge(Yaml::file(path)),
                _ => bail!("Unsupported file type for config file: {}", path.display()),
            },
            None => config.merge(Serialized::defaults(self)),
        };
        Ok(config.extract()?)
    }
}
