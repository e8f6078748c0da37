use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const REGISTRY_ROOTS: &[&str] = &[
    "HKLM", "HKCU", "HKCR", "HKU", "HKCC",
    "HKEY_LOCAL_MACHINE",
    "HKEY_CURRENT_USER",
    "HKEY_CLASSES_ROOT",
    "HKEY_USERS",
    "HKEY_CURRENT_CONFIG",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Created,
    Validated,
    Invalid,
    Restored,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Validated => "validated",
            Self::Invalid => "invalid",
            Self::Restored => "restored",
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupItemKind {
    Registry,
    File,
    Directory,
}

impl BackupItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for BackupItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which items of a backup a restore should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreFilter {
    Registry,
    Files,
    #[default]
    All,
}

impl RestoreFilter {
    pub fn matches(&self, kind: BackupItemKind) -> bool {
        match self {
            Self::All => true,
            Self::Registry => kind == BackupItemKind::Registry,
            Self::Files => matches!(kind, BackupItemKind::File | BackupItemKind::Directory),
        }
    }
}

/// A thing to capture: a registry subtree or a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupSource {
    Registry(String),
    Path(PathBuf),
}

impl BackupSource {
    /// Classifies a raw source string. Anything rooted at a registry hive
    /// abbreviation is a registry key, everything else a filesystem path.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let root = trimmed
            .split(['\\', '/'])
            .next()
            .unwrap_or_default()
            .trim_end_matches(':')
            .to_ascii_uppercase();
        if REGISTRY_ROOTS.contains(&root.as_str()) {
            Self::Registry(trimmed.to_string())
        } else {
            Self::Path(PathBuf::from(trimmed))
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            Self::Registry(key) => key.clone(),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// One captured source inside a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupItem {
    pub kind: BackupItemKind,
    pub source: String,
    /// Path relative to the backup directory; `None` when the source was skipped.
    pub stored: Option<String>,
    pub size_bytes: u64,
    pub file_count: u64,
    pub sha256: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// Catalog record of one point-in-time backup, persisted as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    pub component: String,
    pub migration_run_id: String,
    pub backup_path: PathBuf,
    pub creation_time: DateTime<Utc>,
    pub size_bytes: u64,
    pub file_count: u64,
    pub status: BackupStatus,
    #[serde(default)]
    pub items: Vec<BackupItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Backup {
    pub fn manifest_path(&self) -> PathBuf {
        self.backup_path.join("manifest.json")
    }

    pub fn captured_items(&self) -> impl Iterator<Item = &BackupItem> {
        self.items.iter().filter(|item| item.stored.is_some())
    }
}
