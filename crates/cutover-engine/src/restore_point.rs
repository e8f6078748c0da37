use std::process::Command;

use anyhow::{anyhow, Result};
use chrono::Utc;
use cutover_core::{escape_ps_single_quote, run_command, RestorePoint, RestorePointKind};
use tracing::{info, warn};

pub trait RestorePointProvider {
    fn checkpoint(&self, description: &str) -> Result<()>;
}

/// Requests a Windows System Restore checkpoint through PowerShell.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRestore;

impl RestorePointProvider for SystemRestore {
    fn checkpoint(&self, description: &str) -> Result<()> {
        if !cfg!(windows) {
            return Err(anyhow!("system restore is unavailable on this platform"));
        }

        let script = format!(
            "Checkpoint-Computer -Description '{}' -RestorePointType MODIFY_SETTINGS -ErrorAction Stop",
            escape_ps_single_quote(description)
        );
        let mut command = Command::new("powershell");
        command.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
        run_command(&mut command, "Checkpoint-Computer failed")
    }
}

/// Best-effort bookkeeping of OS snapshots taken before a run.
pub struct RestorePointBridge {
    provider: Box<dyn RestorePointProvider>,
    points: Vec<RestorePoint>,
}

impl Default for RestorePointBridge {
    fn default() -> Self {
        Self::new(Box::new(SystemRestore))
    }
}

impl RestorePointBridge {
    pub fn new(provider: Box<dyn RestorePointProvider>) -> Self {
        Self {
            provider,
            points: Vec::new(),
        }
    }

    /// Never fails loudly: an unavailable or disabled service yields `false`.
    pub fn create(&mut self, description: &str) -> bool {
        match self.provider.checkpoint(description) {
            Ok(()) => {
                info!(description, "system restore point created");
                self.points.push(RestorePoint {
                    description: description.to_string(),
                    creation_time: Utc::now(),
                    kind: RestorePointKind::SystemRestore,
                });
                true
            }
            Err(err) => {
                let detail = format!("{err:#}");
                warn!(description, error = %detail, "system restore point unavailable");
                false
            }
        }
    }

    pub fn points(&self) -> &[RestorePoint] {
        &self.points
    }
}
