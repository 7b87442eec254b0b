use crate::{
    link::{AliveState, LinkHandle, LinkId, Metadata},
    role::Role,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Inspectable state of one tracked link.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkReport {
    pub id: LinkId,
    pub endpoint: String,
    pub role: Role,
    pub alive: AliveState,
    pub unanswered_pings: u32,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_version: Option<String>,
}

impl From<&LinkHandle> for LinkReport {
    fn from(link: &LinkHandle) -> Self {
        let status = link.status();
        Self {
            id: link.id(),
            endpoint: link.endpoint().to_string(),
            role: link.role(),
            alive: status.alive,
            unanswered_pings: status.unanswered_pings,
            metadata: link.metadata().clone(),
            build_version: status.server_info.map(|info| info.build_version),
        }
    }
}

/// Point in time view of the whole pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolReport {
    /// Reconnection attempts of every endpoint seen so far, including the ones currently not in the pool.
    pub attempts: BTreeMap<String, u64>,
    pub links: Vec<LinkReport>,
}

impl PoolReport {
    pub fn alive(&self) -> impl Iterator<Item = &LinkReport> {
        self.links.iter().filter(|link| link.alive == AliveState::Alive)
    }

    pub fn count(&self, role: Role) -> usize {
        self.links.iter().filter(|link| link.role == role).count()
    }
}
