use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cutover_core::{CutoverLayout, MigrationRun};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: String,
    pub name: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Audit trail of one run: `<run_id>.json` holds the latest run snapshot and
/// `<run_id>.journal` one JSON line per step or rollback event.
///
/// Write failures are logged and swallowed; the journal never changes the
/// outcome of a run.
#[derive(Debug)]
pub struct RunJournal {
    metadata_path: PathBuf,
    journal_path: PathBuf,
    next_seq: u64,
}

impl RunJournal {
    pub fn new(layout: &CutoverLayout, run_id: &str) -> Self {
        Self {
            metadata_path: layout.run_metadata_path(run_id),
            journal_path: layout.run_journal_path(run_id),
            next_seq: 1,
        }
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    pub fn record_run(&self, run: &MigrationRun) {
        if let Err(err) = write_run_metadata(&self.metadata_path, run) {
            let detail = format!("{err:#}");
            warn!(run_id = %run.id, error = %detail, "failed to write run metadata");
        }
    }

    pub fn append(&mut self, event: &str, name: &str, state: &str, detail: Option<&str>) {
        let entry = JournalEntry {
            seq: self.next_seq,
            at: Utc::now(),
            event: event.to_string(),
            name: name.to_string(),
            state: state.to_string(),
            detail: detail.map(ToOwned::to_owned),
        };
        self.next_seq += 1;

        if let Err(err) = append_journal_entry(&self.journal_path, &entry) {
            let detail = format!("{err:#}");
            warn!(event, name, error = %detail, "failed to append run journal");
        }
    }
}

fn write_run_metadata(path: &Path, run: &MigrationRun) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut raw = serde_json::to_string_pretty(run).context("failed to serialize run metadata")?;
    raw.push('\n');
    fs::write(path, raw)
        .with_context(|| format!("failed to write run metadata file: {}", path.display()))
}

fn append_journal_entry(path: &Path, entry: &JournalEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut line = serde_json::to_string(entry).context("failed to serialize journal entry")?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open run journal: {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append run journal: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush run journal: {}", path.display()))?;
    Ok(())
}

pub fn read_journal_entries(path: &Path) -> Result<Vec<JournalEntry>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read run journal: {}", path.display()))?;
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| {
                format!(
                    "invalid run journal line {} in {}",
                    index + 1,
                    path.display()
                )
            })
        })
        .collect()
}
