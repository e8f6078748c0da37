use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Phase, RunConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    RolledBack,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePointKind {
    SystemRestore,
}

/// An OS-level snapshot requested before a run. Kept for the operator only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorePoint {
    pub description: String,
    pub creation_time: DateTime<Utc>,
    pub kind: RestorePointKind,
}

/// Identity and lifecycle of one migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRun {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_phase: Option<Phase>,
    pub status: RunStatus,
    /// Set when a failed run had its completed work compensated.
    pub rolled_back: bool,
    pub config: RunConfig,
    pub backup_location: PathBuf,
    pub log_path: PathBuf,
    pub restore_points: Vec<RestorePoint>,
}

impl MigrationRun {
    pub fn new(
        start_time: DateTime<Utc>,
        config: RunConfig,
        backup_location: PathBuf,
        log_path: PathBuf,
    ) -> Self {
        Self {
            id: generate_run_id(start_time),
            start_time,
            end_time: None,
            current_phase: None,
            status: RunStatus::NotStarted,
            rolled_back: false,
            config,
            backup_location,
            log_path,
            restore_points: Vec::new(),
        }
    }
}

pub fn generate_run_id(start_time: DateTime<Utc>) -> String {
    format!("mig-{}", start_time.format("%Y%m%d-%H%M%S"))
}
