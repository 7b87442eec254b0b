use crate::error::UnknownRole;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Functional category an upstream serves. Consumers pick links by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    FullHistory,
    CurrentLedger,
    Pathfinding,
    Submission,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::FullHistory, Role::CurrentLedger, Role::Pathfinding, Role::Submission];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullHistory => "fullhistory",
            Self::CurrentLedger => "currentledger",
            Self::Pathfinding => "pathfinding",
            Self::Submission => "submission",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Role names are matched case-insensitively, `full-history` and `full_history` are accepted as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String =
            s.trim().chars().filter(|c| *c != '-' && *c != '_').map(|c| c.to_ascii_lowercase()).collect();
        Role::ALL.into_iter().find(|role| role.as_str() == normalized).ok_or_else(|| UnknownRole(s.to_string()))
    }
}
