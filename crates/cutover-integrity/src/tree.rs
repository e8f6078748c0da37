use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::sha256_file;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub size_bytes: u64,
    pub file_count: u64,
}

/// Total size and regular-file count under `root`. A plain file counts as one.
pub fn tree_stats(root: &Path) -> Result<TreeStats> {
    let mut stats = TreeStats::default();
    for (_, path) in collect_files(root)? {
        let metadata = fs::metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        stats.size_bytes += metadata.len();
        stats.file_count += 1;
    }
    Ok(stats)
}

/// Digest over every file below `root`, keyed by relative path so that a
/// renamed file changes the result. A plain file hashes like `sha256_file`.
pub fn sha256_tree(root: &Path) -> Result<String> {
    let metadata =
        fs::metadata(root).with_context(|| format!("failed to stat {}", root.display()))?;
    if metadata.is_file() {
        return sha256_file(root);
    }

    let mut hasher = Sha256::new();
    for (rel, path) in collect_files(root)? {
        hasher.update(rel.as_bytes());
        hasher.update([0_u8]);
        hasher.update(sha256_file(&path)?.as_bytes());
        hasher.update([b'\n']);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let metadata =
        fs::metadata(root).with_context(|| format!("failed to stat {}", root.display()))?;
    if metadata.is_file() {
        return Ok(vec![(String::new(), root.to_path_buf())]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?
        {
            let entry = entry.with_context(|| format!("failed to iterate {}", dir.display()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", path.display()))?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let rel = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push((rel, path));
            }
        }
    }
    files.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(files)
}
