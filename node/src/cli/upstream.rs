use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};
use uc_upstream::{LinkOptions, Role, WsConnector};
use up_utils::{
    parsers::parse_duration,
    serde::{deserialize_duration, serialize_duration},
};

/// Upstream used when none is given.
pub const DEFAULT_UPSTREAM: &str = "wss://xrplcluster.com";

/// An upstream to dial on startup, written `<role>=<ws url>`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct UpstreamSeed {
    pub role: Role,
    /// Kept as written: it is the key of the attempt counters and shows up in the logs.
    pub endpoint: String,
}

impl FromStr for UpstreamSeed {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let (role, endpoint) =
            s.split_once('=').with_context(|| format!("Invalid upstream `{s}`, expected `<role>=<ws url>`"))?;
        let role = role.trim().parse::<Role>()?;
        let endpoint = endpoint.trim();
        WsConnector::parse_endpoint(endpoint).map_err(|err| anyhow::anyhow!("{err}"))?;
        Ok(Self { role, endpoint: endpoint.to_string() })
    }
}

impl TryFrom<String> for UpstreamSeed {
    type Error = anyhow::Error;
    fn try_from(value: String) -> anyhow::Result<Self> {
        value.parse()
    }
}

impl From<UpstreamSeed> for String {
    fn from(seed: UpstreamSeed) -> Self {
        seed.to_string()
    }
}

impl fmt::Display for UpstreamSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.role, self.endpoint)
    }
}

fn parse_seed(s: &str) -> anyhow::Result<UpstreamSeed> {
    s.parse()
}

#[derive(Clone, Debug, PartialEq, clap::Args, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamParams {
    /// Upstream to connect to, as `<role>=<ws url>`. Can be given several times. The role is one of
    /// `fullhistory`, `currentledger`, `pathfinding` or `submission`.
    ///
    /// When no upstream is given, `wss://xrplcluster.com` is used as a `currentledger` upstream.
    #[arg(env = "UPLINK_UPSTREAMS", long = "upstream", value_name = "ROLE=URL", value_parser = parse_seed, value_delimiter = ',')]
    pub upstreams: Vec<UpstreamSeed>,

    /// How long to wait for the WebSocket connection to open.
    #[arg(env = "UPLINK_CONNECT_TIMEOUT", long, value_parser = parse_duration, default_value = "5s", value_name = "DURATION")]
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,

    /// How long an open connection has to answer the `server_info` handshake.
    #[arg(env = "UPLINK_READY_TIMEOUT", long, value_parser = parse_duration, default_value = "5s", value_name = "DURATION")]
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub ready_timeout: Duration,

    /// Interval between two pings. A connection is dropped after 3 unanswered pings in a row.
    #[arg(env = "UPLINK_KEEPALIVE_INTERVAL", long, value_parser = parse_duration, default_value = "1500ms", value_name = "DURATION")]
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub keepalive_interval: Duration,
}

impl Default for UpstreamParams {
    fn default() -> Self {
        let options = LinkOptions::default();
        Self {
            upstreams: vec![],
            connect_timeout: options.connect_timeout,
            ready_timeout: options.ready_timeout,
            keepalive_interval: options.keepalive_interval,
        }
    }
}

impl UpstreamParams {
    pub fn seeds(&self) -> Vec<UpstreamSeed> {
        if self.upstreams.is_empty() {
            return vec![UpstreamSeed { role: Role::CurrentLedger, endpoint: DEFAULT_UPSTREAM.to_string() }];
        }
        self.upstreams.clone()
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions::default()
            .connect_timeout(self.connect_timeout)
            .ready_timeout(self.ready_timeout)
            .keepalive_interval(self.keepalive_interval)
    }
}
