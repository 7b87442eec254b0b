//! JSON command/response envelopes spoken with upstream ledger nodes.
//!
//! Requests are flat objects `{id, command, ...params}`. The remote node echoes `id` back unchanged, which
//! lets us tag our own keepalive probes with a `pong` marker and correlate the replies locally.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Correlation id tag understood by this crate. Unknown keys are carried along in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTag {
    /// Logging hint: responses carrying this tag are not logged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppress_response: Option<bool>,
    /// Marks keepalive probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pong: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandId {
    Number(serde_json::Number),
    String(String),
    Tag(CommandTag),
}

impl From<u64> for CommandId {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for CommandId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<CommandTag> for CommandId {
    fn from(value: CommandTag) -> Self {
        Self::Tag(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommandId>,
    pub command: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Command {
    pub fn new(command: impl Into<String>) -> Self {
        Self { id: None, command: command.into(), params: Map::new() }
    }

    pub fn with_id(self, id: impl Into<CommandId>) -> Self {
        Self { id: Some(id.into()), ..self }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Handshake request.
    pub fn server_info() -> Self {
        Self::new("server_info").with_id(CommandTag { suppress_response: Some(true), ..Default::default() })
    }

    /// Keepalive probe.
    pub fn ping() -> Self {
        Self::new("ping").with_id(CommandTag { suppress_response: Some(true), pong: Some(true), ..Default::default() })
    }

    pub fn tag(&self) -> Option<&CommandTag> {
        match &self.id {
            Some(CommandId::Tag(tag)) => Some(tag),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Inbound message envelope. Every field is optional, shapes we do not know about are kept untouched.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Response {
    /// Returns `None` for anything that is not a non-empty JSON object.
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        if !value.as_object().is_some_and(|object| !object.is_empty()) {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Our own correlation tag, if `id` is an object.
    pub fn tag(&self) -> Option<CommandTag> {
        self.id.as_ref().filter(|id| id.is_object()).and_then(|id| serde_json::from_value(id.clone()).ok())
    }

    pub fn is_response(&self) -> bool {
        self.kind.as_deref() == Some("response")
    }

    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("success")
    }

    pub fn is_suppressed(&self) -> bool {
        self.tag().and_then(|tag| tag.suppress_response).unwrap_or(false)
    }

    /// Reply to one of our keepalive probes.
    pub fn is_pong(&self) -> bool {
        self.is_response() && self.tag().and_then(|tag| tag.pong).unwrap_or(false)
    }

    /// The handshake payload, if this is a successful `server_info` response with a build version.
    pub fn server_info(&self) -> Option<ServerInfo> {
        if !self.is_success() || !self.is_response() {
            return None;
        }
        let info = self.result.as_ref()?.get("info")?.as_object()?;
        ServerInfo::from_info(info)
    }
}

/// Subset of the `server_info` payload we care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub build_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_ledgers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_ledger: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerInfo {
    /// Only `build_version` is required. Optional fields with an unexpected type are left in `extra`.
    pub fn from_info(info: &Map<String, Value>) -> Option<Self> {
        let build_version = match info.get("build_version")? {
            Value::String(version) if !version.is_empty() => version.clone(),
            _ => return None,
        };

        let mut extra = info.clone();
        extra.remove("build_version");
        Some(Self {
            build_version,
            hostid: take_field(&mut extra, "hostid"),
            network_id: take_field(&mut extra, "network_id"),
            complete_ledgers: take_field(&mut extra, "complete_ledgers"),
            server_state: take_field(&mut extra, "server_state"),
            pubkey_node: take_field(&mut extra, "pubkey_node"),
            peers: take_field(&mut extra, "peers"),
            validated_ledger: take_field(&mut extra, "validated_ledger"),
            extra,
        })
    }
}

fn take_field<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = T::deserialize(fields.get(key)?).ok()?;
    fields.remove(key);
    Some(value)
}
