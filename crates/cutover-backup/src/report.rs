use std::path::PathBuf;

use cutover_core::{BackupItemKind, CutoverError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityCheck {
    pub valid: bool,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreItemOutcome {
    pub source: String,
    pub kind: BackupItemKind,
    pub restored: bool,
    pub pre_restore_path: Option<PathBuf>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored_count: usize,
    pub failed_count: usize,
    pub items: Vec<RestoreItemOutcome>,
}

impl RestoreReport {
    pub fn is_complete(&self) -> bool {
        self.failed_count == 0 && self.restored_count > 0
    }

    pub(crate) fn push(&mut self, outcome: RestoreItemOutcome) {
        if outcome.restored {
            self.restored_count += 1;
        } else {
            self.failed_count += 1;
        }
        self.items.push(outcome);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemValidation {
    pub source: String,
    pub kind: BackupItemKind,
    pub valid: bool,
    pub detail: String,
}

/// Post-restore findings, one entry per captured item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid_items: usize,
    pub invalid_items: usize,
    pub details: Vec<ItemValidation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_items == 0
    }

    /// Summarises invalid items as a `Validation` error without raising it.
    pub fn as_error(&self) -> Option<CutoverError> {
        if self.is_valid() {
            return None;
        }
        let failing = self
            .details
            .iter()
            .filter(|item| !item.valid)
            .map(|item| format!("{} ({})", item.source, item.detail))
            .collect::<Vec<_>>();
        Some(CutoverError::Validation(failing.join("; ")))
    }

    pub(crate) fn push(&mut self, item: ItemValidation) {
        if item.valid {
            self.valid_items += 1;
        } else {
            self.invalid_items += 1;
        }
        self.details.push(item);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub kept: usize,
}
