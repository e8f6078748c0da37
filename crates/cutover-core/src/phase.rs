use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Logical grouping of migration steps.
///
/// The ordering is only used to detect phase regressions in the log. Steps
/// always execute in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preparation,
    Disconnect,
    Reconnect,
    Verification,
    Cleanup,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Self::Preparation,
        Self::Disconnect,
        Self::Reconnect,
        Self::Verification,
        Self::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preparation => "preparation",
            Self::Disconnect => "disconnect",
            Self::Reconnect => "reconnect",
            Self::Verification => "verification",
            Self::Cleanup => "cleanup",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| anyhow!("invalid phase: {value}"))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
