use crate::protocol::{Response, ServerInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A link declares its peer dead once more than this many keepalive probes went unanswered.
pub const MAX_UNANSWERED_PINGS: u32 = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliveState {
    /// No handshake response yet.
    #[default]
    Unknown,
    Alive,
    /// Terminal.
    Dead,
}

impl AliveState {
    /// `Unknown` is neither alive nor dead.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::Alive => Some(true),
            Self::Dead => Some(false),
        }
    }
}

impl fmt::Display for AliveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Alive => write!(f, "alive"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// What an inbound message turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    Pong { transition: Option<bool> },
    ServerInfo { first: bool, transition: Option<bool> },
    Other,
}

impl Inbound {
    pub fn transition(&self) -> Option<bool> {
        match self {
            Self::Pong { transition } | Self::ServerInfo { transition, .. } => *transition,
            Self::Other => None,
        }
    }
}

/// Health bookkeeping of a single link, without any I/O.
///
/// Every mutating method returns the observable alive transition, if any. `Some(value)` must be forwarded to the
/// registry exactly once, `None` means nothing changed.
///
/// Invariants:
/// - `Dead` is terminal, nothing ever moves a link out of it.
/// - The first `set_alive(true)` always produces a transition since `Unknown` is neither true nor false.
#[derive(Debug, Clone, Default)]
pub struct LinkState {
    alive: AliveState,
    unanswered_pings: u32,
    server_info: Option<ServerInfo>,
}

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alive(&self) -> AliveState {
        self.alive
    }

    pub fn unanswered_pings(&self) -> u32 {
        self.unanswered_pings
    }

    /// Last handshake payload received.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn set_alive(&mut self, value: bool) -> Option<bool> {
        if self.alive == AliveState::Dead || self.alive.as_bool() == Some(value) {
            return None;
        }
        self.alive = if value { AliveState::Alive } else { AliveState::Dead };
        Some(value)
    }

    pub fn on_response(&mut self, response: &Response) -> Inbound {
        if response.is_pong() {
            self.unanswered_pings = 0;
            let transition = if self.server_info.is_some() { self.set_alive(true) } else { None };
            return Inbound::Pong { transition };
        }

        if let Some(info) = response.server_info() {
            let first = self.server_info.is_none();
            self.server_info = Some(info);
            let transition = if first { self.set_alive(true) } else { None };
            return Inbound::ServerInfo { first, transition };
        }

        Inbound::Other
    }

    /// Called after every keepalive probe hits the wire.
    pub fn on_keepalive_sent(&mut self) -> Option<bool> {
        self.unanswered_pings = self.unanswered_pings.saturating_add(1);
        if self.unanswered_pings > MAX_UNANSWERED_PINGS {
            return self.set_alive(false);
        }
        None
    }

    pub fn close(&mut self) -> Option<bool> {
        self.set_alive(false)
    }
}
