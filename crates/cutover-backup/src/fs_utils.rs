use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

pub(crate) fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(src)
        .with_context(|| format!("failed to stat source path: {}", src.display()))?;

    if metadata.is_dir() {
        fs::create_dir_all(dst)
            .with_context(|| format!("failed to create directory: {}", dst.display()))?;
        for entry in
            fs::read_dir(src).with_context(|| format!("failed to read directory: {}", src.display()))?
        {
            let entry =
                entry.with_context(|| format!("failed to iterate directory: {}", src.display()))?;
            copy_tree(&entry.path(), &dst.join(entry.file_name()))?;
        }
        return Ok(());
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    #[cfg(unix)]
    if metadata.file_type().is_symlink() {
        let target = fs::read_link(src)
            .with_context(|| format!("failed to read symlink: {}", src.display()))?;
        std::os::unix::fs::symlink(&target, dst).with_context(|| {
            format!(
                "failed to copy symlink {} -> {}",
                dst.display(),
                target.display()
            )
        })?;
        return Ok(());
    }

    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Claims a fresh directory under `parent` named after `now`. Two calls in
/// the same millisecond get distinct suffixed names.
pub(crate) fn claim_backup_dir(parent: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let stamp = now.format("%Y%m%d-%H%M%S-%3f").to_string();
    for attempt in 0..1000_u32 {
        let candidate = if attempt == 0 {
            parent.join(&stamp)
        } else {
            parent.join(format!("{stamp}-{attempt}"))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to create backup directory: {}", candidate.display())
                });
            }
        }
    }

    Err(anyhow!(
        "could not claim a unique backup directory under {}",
        parent.display()
    ))
}

/// Sibling path an existing destination is moved to before a forced restore.
pub(crate) fn pre_restore_path(dest: &Path, now: DateTime<Utc>) -> PathBuf {
    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string());
    let stamp = now.format("%Y%m%d%H%M%S");

    let mut candidate = dest.with_file_name(format!("{file_name}.{stamp}.pre_restore"));
    let mut attempt = 1_u32;
    while candidate.exists() {
        candidate = dest.with_file_name(format!("{file_name}.{stamp}-{attempt}.pre_restore"));
        attempt += 1;
    }
    candidate
}

pub(crate) fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

pub(crate) fn validate_component_name(component: &str) -> Result<()> {
    let trimmed = component.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("backup component name must not be empty"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(anyhow!("invalid backup component name: {component}"));
    }
    if trimmed
        .chars()
        .any(|ch| matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return Err(anyhow!(
            "backup component name contains path characters: {component}"
        ));
    }
    Ok(())
}
