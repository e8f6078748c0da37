use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use cutover_core::Backup;
use tracing::info;

use crate::manifest::read_manifest;
use crate::report::CleanupReport;

/// Reopens a backup from its directory or its `manifest.json`.
pub fn load_backup(path: &Path) -> Result<Backup> {
    let manifest_path = if path.is_dir() {
        path.join("manifest.json")
    } else {
        path.to_path_buf()
    };
    read_manifest(&manifest_path)?
        .ok_or_else(|| anyhow!("backup manifest not found: {}", manifest_path.display()))
}

/// Every backup below `backup_location`, oldest first. `run_id` narrows the
/// scan to one run.
pub fn list_backups(backup_location: &Path, run_id: Option<&str>) -> Result<Vec<Backup>> {
    let run_dirs = match run_id {
        Some(run_id) => vec![backup_location.join(run_id)],
        None => child_dirs(backup_location)?,
    };

    let mut backups = Vec::new();
    for run_dir in run_dirs {
        for component_dir in child_dirs(&run_dir)? {
            for backup_dir in child_dirs(&component_dir)? {
                if let Some(backup) = read_manifest(&backup_dir.join("manifest.json"))? {
                    backups.push(backup);
                }
            }
        }
    }

    backups.sort_by(|left, right| {
        left.creation_time
            .cmp(&right.creation_time)
            .then_with(|| left.backup_path.cmp(&right.backup_path))
    });
    Ok(backups)
}

/// Deletes backups created before `now - max_age`. Emptied component and
/// run directories are removed as well.
pub fn cleanup_backups(
    backup_location: &Path,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<CleanupReport> {
    let cutoff = now - max_age;
    let mut report = CleanupReport::default();

    for backup in list_backups(backup_location, None)? {
        if backup.creation_time >= cutoff {
            report.kept += 1;
            continue;
        }
        fs::remove_dir_all(&backup.backup_path).with_context(|| {
            format!(
                "failed to remove expired backup: {}",
                backup.backup_path.display()
            )
        })?;
        info!(
            component = %backup.component,
            run_id = %backup.migration_run_id,
            path = %backup.backup_path.display(),
            "expired backup removed"
        );
        report.removed.push(backup.backup_path);
    }

    for run_dir in child_dirs(backup_location)? {
        for component_dir in child_dirs(&run_dir)? {
            remove_dir_if_empty(&component_dir)?;
        }
        remove_dir_if_empty(&run_dir)?;
    }

    Ok(report)
}

fn child_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", dir.display()));
        }
    };

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to iterate {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", entry.path().display()))?;
        if file_type.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn remove_dir_if_empty(dir: &Path) -> Result<()> {
    let is_empty = fs::read_dir(dir)
        .with_context(|| format!("failed to read {}", dir.display()))?
        .next()
        .is_none();
    if is_empty {
        fs::remove_dir(dir).with_context(|| format!("failed to remove {}", dir.display()))?;
    }
    Ok(())
}
