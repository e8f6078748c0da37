use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cutover_core::{
    Backup, BackupItem, BackupItemKind, BackupSource, BackupStatus, CutoverError, CutoverLayout,
    RestoreFilter,
};
use cutover_integrity::{sha256_file, sha256_tree, tree_stats};
use tracing::{debug, info, warn};

use crate::fs_utils::{
    claim_backup_dir, copy_tree, path_exists, pre_restore_path, validate_component_name,
};
use crate::manifest::write_manifest;
use crate::registry::{RegExe, RegistryTool, MIN_REGISTRY_EXPORT_BYTES};
use crate::report::{
    IntegrityCheck, ItemValidation, RestoreItemOutcome, RestoreReport, ValidationReport,
};

/// Creates, validates and restores backups for one migration run.
///
/// Cloning is cheap, so step bodies can capture their own handle.
#[derive(Clone)]
pub struct BackupStore {
    layout: CutoverLayout,
    run_id: String,
    registry: Arc<dyn RegistryTool>,
}

impl fmt::Debug for BackupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupStore")
            .field("layout", &self.layout)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl BackupStore {
    pub fn new(layout: CutoverLayout, run_id: impl Into<String>) -> Self {
        Self {
            layout,
            run_id: run_id.into(),
            registry: Arc::new(RegExe::default()),
        }
    }

    pub fn with_registry_tool(mut self, registry: Arc<dyn RegistryTool>) -> Self {
        self.registry = registry;
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn layout(&self) -> &CutoverLayout {
        &self.layout
    }

    pub fn create_backup(&self, component: &str, sources: &[BackupSource]) -> Result<Backup> {
        self.create_backup_with_data(component, sources, None)
    }

    /// Captures every source into a fresh directory below
    /// `<backup_location>/<run_id>/<component>/` and writes its manifest.
    ///
    /// Missing sources and failed registry exports are recorded as skipped
    /// items; only I/O failures inside the backup directory are errors.
    pub fn create_backup_with_data(
        &self,
        component: &str,
        sources: &[BackupSource],
        data: Option<serde_json::Value>,
    ) -> Result<Backup> {
        validate_component_name(component)?;
        let creation_time = Utc::now();
        let backup_path = claim_backup_dir(
            &self.layout.component_dir(&self.run_id, component),
            creation_time,
        )?;

        let mut items = Vec::with_capacity(sources.len());
        for (index, source) in sources.iter().enumerate() {
            let item = match source {
                BackupSource::Registry(key) => self.capture_registry_key(&backup_path, index, key)?,
                BackupSource::Path(path) => capture_path(&backup_path, index, path)?,
            };
            if let Some(reason) = &item.skipped_reason {
                warn!(
                    component,
                    source = %item.source,
                    reason = %reason,
                    "backup source skipped"
                );
            }
            items.push(item);
        }

        let backup = Backup {
            component: component.to_string(),
            migration_run_id: self.run_id.clone(),
            size_bytes: items.iter().map(|item| item.size_bytes).sum(),
            file_count: items.iter().map(|item| item.file_count).sum(),
            backup_path,
            creation_time,
            status: BackupStatus::Created,
            items,
            data,
        };
        write_manifest(&backup)?;

        info!(
            run_id = %self.run_id,
            component,
            path = %backup.backup_path.display(),
            size_bytes = backup.size_bytes,
            file_count = backup.file_count,
            "backup created"
        );
        Ok(backup)
    }

    fn capture_registry_key(
        &self,
        backup_path: &Path,
        index: usize,
        key: &str,
    ) -> Result<BackupItem> {
        let rel = format!("registry/{index}.reg");
        let dest = backup_path.join(&rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if let Err(err) = self.registry.export_key(key, &dest) {
            let _ = fs::remove_file(&dest);
            return Ok(skipped_item(
                BackupItemKind::Registry,
                key.to_string(),
                format!("{err:#}"),
            ));
        }
        if !dest.is_file() {
            return Ok(skipped_item(
                BackupItemKind::Registry,
                key.to_string(),
                "export produced no file".to_string(),
            ));
        }

        let stats = tree_stats(&dest)?;
        Ok(BackupItem {
            kind: BackupItemKind::Registry,
            source: key.to_string(),
            stored: Some(rel),
            size_bytes: stats.size_bytes,
            file_count: stats.file_count,
            sha256: Some(sha256_file(&dest)?),
            modified: Some(Utc::now()),
            skipped_reason: None,
        })
    }

    /// Structural check of a backup against its manifest, without side effects.
    pub fn check_integrity(&self, backup: &Backup) -> IntegrityCheck {
        let mut problems = Vec::new();

        if backup.size_bytes == 0 {
            problems.push("backup captured zero bytes".to_string());
        }
        if backup.captured_items().next().is_none() {
            problems.push("backup holds no captured items".to_string());
        }

        for item in backup.captured_items() {
            let Some(rel) = item.stored.as_deref() else {
                continue;
            };
            let stored = backup.backup_path.join(rel);
            if !path_exists(&stored) {
                problems.push(format!("{}: stored copy missing", item.source));
                continue;
            }
            match tree_stats(&stored) {
                Ok(stats) => {
                    if stats.size_bytes != item.size_bytes {
                        problems.push(format!(
                            "{}: size {} does not match manifest size {}",
                            item.source, stats.size_bytes, item.size_bytes
                        ));
                    }
                    if stats.file_count != item.file_count {
                        problems.push(format!(
                            "{}: file count {} does not match manifest count {}",
                            item.source, stats.file_count, item.file_count
                        ));
                    }
                }
                Err(err) => problems.push(format!("{}: {err:#}", item.source)),
            }
            if let Some(expected) = &item.sha256 {
                match sha256_tree(&stored) {
                    Ok(actual) if &actual != expected => problems.push(format!(
                        "{}: content hash does not match manifest",
                        item.source
                    )),
                    Ok(_) => {}
                    Err(err) => problems.push(format!("{}: {err:#}", item.source)),
                }
            }
            if item.kind == BackupItemKind::Registry && item.size_bytes < MIN_REGISTRY_EXPORT_BYTES
            {
                problems.push(format!(
                    "{}: registry export of {} bytes is implausibly small",
                    item.source, item.size_bytes
                ));
            }
        }

        IntegrityCheck {
            valid: problems.is_empty(),
            problems,
        }
    }

    /// Marks the backup `Validated` or `Invalid` and persists the new status.
    pub fn validate_integrity(&self, backup: &mut Backup) -> bool {
        let check = self.check_integrity(backup);
        for problem in &check.problems {
            warn!(component = %backup.component, problem = %problem, "backup integrity problem");
        }

        backup.status = if check.valid {
            BackupStatus::Validated
        } else {
            BackupStatus::Invalid
        };
        persist_status(backup);

        info!(
            component = %backup.component,
            valid = check.valid,
            "backup integrity validated"
        );
        check.valid
    }

    /// Restores the items selected by `filter` to their original locations.
    ///
    /// The backup must have passed `validate_integrity` first. Per-item
    /// failures are counted in the report and never abort the restore.
    pub fn restore(
        &self,
        backup: &mut Backup,
        filter: RestoreFilter,
        force: bool,
    ) -> std::result::Result<RestoreReport, CutoverError> {
        if !matches!(
            backup.status,
            BackupStatus::Validated | BackupStatus::Restored
        ) {
            return Err(CutoverError::BackupIntegrity {
                component: backup.component.clone(),
                detail: format!(
                    "backup status is '{}'; it must be validated before restoring",
                    backup.status
                ),
            });
        }

        let now = Utc::now();
        let mut report = RestoreReport::default();
        for item in backup.captured_items().filter(|item| filter.matches(item.kind)) {
            let Some(rel) = item.stored.as_deref() else {
                continue;
            };
            let stored = backup.backup_path.join(rel);
            let outcome = match item.kind {
                BackupItemKind::Registry => self.restore_registry_item(item, &stored),
                BackupItemKind::File | BackupItemKind::Directory => {
                    restore_path_item(item, &stored, force, now)
                }
            };
            if let Some(detail) = &outcome.detail {
                if !outcome.restored {
                    warn!(source = %outcome.source, detail = %detail, "restore item failed");
                }
            }
            report.push(outcome);
        }

        if report.is_complete() {
            backup.status = BackupStatus::Restored;
            persist_status(backup);
        }

        info!(
            component = %backup.component,
            restored = report.restored_count,
            failed = report.failed_count,
            "backup restore finished"
        );
        Ok(report)
    }

    fn restore_registry_item(&self, item: &BackupItem, stored: &Path) -> RestoreItemOutcome {
        match self.registry.import_file(stored) {
            Ok(()) => RestoreItemOutcome {
                source: item.source.clone(),
                kind: item.kind,
                restored: true,
                pre_restore_path: None,
                detail: None,
            },
            Err(err) => RestoreItemOutcome {
                source: item.source.clone(),
                kind: item.kind,
                restored: false,
                pre_restore_path: None,
                detail: Some(format!("{err:#}")),
            },
        }
    }

    /// Checks every captured item at its original location.
    pub fn test_restoration_validity(&self, backup: &Backup) -> ValidationReport {
        let mut report = ValidationReport::default();
        for item in backup.captured_items() {
            let (valid, detail) = match item.kind {
                BackupItemKind::Registry => match self.registry.key_exists(&item.source) {
                    Ok(true) => (true, "registry key present".to_string()),
                    Ok(false) => (false, "registry key not present".to_string()),
                    Err(err) => (false, format!("registry query failed: {err:#}")),
                },
                BackupItemKind::File | BackupItemKind::Directory => {
                    compare_restored_content(backup, item)
                }
            };
            debug!(source = %item.source, valid, detail = %detail, "restoration check");
            report.push(ItemValidation {
                source: item.source.clone(),
                kind: item.kind,
                valid,
                detail,
            });
        }
        report
    }
}

fn capture_path(backup_path: &Path, index: usize, source: &Path) -> Result<BackupItem> {
    let source_label = source.display().to_string();
    let metadata = match fs::symlink_metadata(source) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(skipped_item(
                BackupItemKind::File,
                source_label,
                "source not found".to_string(),
            ));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to stat {}", source.display()));
        }
    };

    let kind = if metadata.is_dir() {
        BackupItemKind::Directory
    } else {
        BackupItemKind::File
    };
    let file_name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let rel = format!("files/{index}/{file_name}");
    let dest = backup_path.join(&rel);
    copy_tree(source, &dest)?;

    let stats = tree_stats(&dest)?;
    Ok(BackupItem {
        kind,
        source: source_label,
        stored: Some(rel),
        size_bytes: stats.size_bytes,
        file_count: stats.file_count,
        sha256: Some(sha256_tree(&dest)?),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        skipped_reason: None,
    })
}

fn restore_path_item(
    item: &BackupItem,
    stored: &Path,
    force: bool,
    now: DateTime<Utc>,
) -> RestoreItemOutcome {
    let dest = PathBuf::from(&item.source);
    let mut outcome = RestoreItemOutcome {
        source: item.source.clone(),
        kind: item.kind,
        restored: false,
        pre_restore_path: None,
        detail: None,
    };

    if path_exists(&dest) {
        if !force {
            outcome.detail = Some("destination exists; use force to overwrite".to_string());
            return outcome;
        }
        let preserved = pre_restore_path(&dest, now);
        if let Err(err) = fs::rename(&dest, &preserved) {
            outcome.detail = Some(format!(
                "failed to preserve existing {} as {}: {err}",
                dest.display(),
                preserved.display()
            ));
            return outcome;
        }
        outcome.pre_restore_path = Some(preserved);
    }

    match copy_tree(stored, &dest) {
        Ok(()) => outcome.restored = true,
        Err(err) => {
            let mut detail = format!("{err:#}");
            if let Some(preserved) = outcome.pre_restore_path.take() {
                if let Err(undo) = put_back(&preserved, &dest) {
                    detail.push_str(&format!(
                        "; original left at {}: {undo:#}",
                        preserved.display()
                    ));
                    outcome.pre_restore_path = Some(preserved);
                }
            }
            outcome.detail = Some(detail);
        }
    }
    outcome
}

/// Returns a preserved destination to its place after a failed copy.
fn put_back(preserved: &Path, dest: &Path) -> Result<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest)
            .with_context(|| format!("failed to remove partial restore: {}", dest.display()))?,
        Ok(_) => fs::remove_file(dest)
            .with_context(|| format!("failed to remove partial restore: {}", dest.display()))?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to inspect {}", dest.display()));
        }
    }
    fs::rename(preserved, dest).with_context(|| {
        format!(
            "failed to move {} back to {}",
            preserved.display(),
            dest.display()
        )
    })
}

fn compare_restored_content(backup: &Backup, item: &BackupItem) -> (bool, String) {
    let dest = Path::new(&item.source);
    if !path_exists(dest) {
        return (false, "restored path missing".to_string());
    }

    let expected = match (&item.sha256, item.stored.as_deref()) {
        (Some(hash), _) => hash.clone(),
        (None, Some(rel)) => match sha256_tree(&backup.backup_path.join(rel)) {
            Ok(hash) => hash,
            Err(err) => return (false, format!("failed to hash backed-up copy: {err:#}")),
        },
        (None, None) => return (false, "item was never captured".to_string()),
    };

    match sha256_tree(dest) {
        Ok(actual) if actual == expected => (true, "content hash matches".to_string()),
        Ok(_) => (false, "content hash mismatch".to_string()),
        Err(err) => (false, format!("failed to hash restored path: {err:#}")),
    }
}

fn skipped_item(kind: BackupItemKind, source: String, reason: String) -> BackupItem {
    BackupItem {
        kind,
        source,
        stored: None,
        size_bytes: 0,
        file_count: 0,
        sha256: None,
        modified: None,
        skipped_reason: Some(reason),
    }
}

fn persist_status(backup: &Backup) {
    if let Err(err) = write_manifest(backup) {
        let detail = format!("{err:#}");
        warn!(
            component = %backup.component,
            error = %detail,
            "failed to persist backup status"
        );
    }
}
