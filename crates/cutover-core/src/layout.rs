use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// On-disk layout shared by the engine, the backup store and the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutoverLayout {
    backup_location: PathBuf,
    log_path: PathBuf,
}

impl CutoverLayout {
    pub fn new(backup_location: impl Into<PathBuf>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            backup_location: backup_location.into(),
            log_path: log_path.into(),
        }
    }

    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::new(root.join("backups"), root.join("logs"))
    }

    pub fn backup_location(&self) -> &Path {
        &self.backup_location
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn run_backup_dir(&self, run_id: &str) -> PathBuf {
        self.backup_location.join(run_id)
    }

    pub fn component_dir(&self, run_id: &str, component: &str) -> PathBuf {
        self.run_backup_dir(run_id).join(component)
    }

    pub fn run_metadata_path(&self, run_id: &str) -> PathBuf {
        self.log_path.join(format!("{run_id}.json"))
    }

    pub fn run_journal_path(&self, run_id: &str) -> PathBuf {
        self.log_path.join(format!("{run_id}.journal"))
    }

    pub fn log_file_path(&self, stamp: &str) -> PathBuf {
        self.log_path.join(format!("cutover-{stamp}.log"))
    }

    /// Reserves a run ID by creating its journal file. A taken `base` gets a
    /// `-N` suffix, so two runs never share metadata, journal or backups.
    pub fn claim_run_id(&self, base: &str) -> Result<String> {
        fs::create_dir_all(&self.log_path)
            .with_context(|| format!("failed to create {}", self.log_path.display()))?;

        for attempt in 0..1000_u32 {
            let candidate = if attempt == 0 {
                base.to_string()
            } else {
                format!("{base}-{attempt}")
            };
            let journal = self.run_journal_path(&candidate);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&journal)
            {
                Ok(_) => return Ok(candidate),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("failed to create run journal: {}", journal.display())
                    });
                }
            }
        }

        Err(anyhow!(
            "could not claim a unique run id for {base} under {}",
            self.log_path.display()
        ))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [&self.backup_location, &self.log_path] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn default_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let program_data = std::env::var("ProgramData")
            .context("ProgramData is not set; cannot resolve Windows cutover root")?;
        return Ok(PathBuf::from(program_data).join("Cutover"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve cutover root")?;
    Ok(PathBuf::from(home).join(".cutover"))
}
