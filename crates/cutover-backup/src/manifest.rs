use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use cutover_core::Backup;

pub fn write_manifest(backup: &Backup) -> Result<PathBuf> {
    let path = backup.manifest_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut raw = serde_json::to_string_pretty(backup)
        .with_context(|| format!("failed to serialize backup manifest: {}", path.display()))?;
    raw.push('\n');

    // Write then rename so a reader never sees a half-written manifest.
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, raw)
        .with_context(|| format!("failed to write backup manifest: {}", staging.display()))?;
    fs::rename(&staging, &path)
        .with_context(|| format!("failed to commit backup manifest: {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> Result<Option<Backup>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read backup manifest: {}", path.display()));
        }
    };

    let backup: Backup = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing backup manifest: {}", path.display()))?;
    if backup.component.trim().is_empty() {
        return Err(anyhow!(
            "backup manifest has an empty component: {}",
            path.display()
        ));
    }
    Ok(Some(backup))
}
