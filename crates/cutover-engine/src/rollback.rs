use std::fmt;

use cutover_core::{CutoverError, RestorePoint};
use tracing::{error, info, warn};

use crate::step::{invoke, StepAction};

/// Informational ordering hint carried by free-standing rollback actions.
/// Execution order is always LIFO regardless of priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum RollbackPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl RollbackPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for RollbackPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub enum RollbackEntry {
    /// Compensation of a completed step, `index` being its registration slot.
    Step {
        name: String,
        index: usize,
        compensation: StepAction,
    },
    Standalone {
        name: String,
        compensation: StepAction,
        priority: RollbackPriority,
    },
}

impl RollbackEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Step { name, .. } | Self::Standalone { name, .. } => name,
        }
    }

    pub fn priority(&self) -> RollbackPriority {
        match self {
            Self::Step { .. } => RollbackPriority::Normal,
            Self::Standalone { priority, .. } => *priority,
        }
    }

    pub fn is_step(&self) -> bool {
        matches!(self, Self::Step { .. })
    }

    fn compensation_mut(&mut self) -> &mut StepAction {
        match self {
            Self::Step { compensation, .. } | Self::Standalone { compensation, .. } => {
                compensation
            }
        }
    }
}

impl fmt::Debug for RollbackEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step { name, index, .. } => f
                .debug_struct("Step")
                .field("name", name)
                .field("index", index)
                .finish_non_exhaustive(),
            Self::Standalone { name, priority, .. } => f
                .debug_struct("Standalone")
                .field("name", name)
                .field("priority", priority)
                .finish_non_exhaustive(),
        }
    }
}

/// LIFO record of completed, reversible work.
#[derive(Debug, Default)]
pub struct RollbackStack {
    entries: Vec<RollbackEntry>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: RollbackEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) -> Option<RollbackEntry> {
        self.entries.pop()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names from bottom to top.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(RollbackEntry::name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name() == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Keep compensating after a failed compensation.
    pub force: bool,
    /// Stop once the entry with this name has been processed.
    pub stop_after: Option<String>,
}

impl RollbackOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            stop_after: None,
        }
    }

    pub fn stop_after(name: impl Into<String>) -> Self {
        Self {
            force: false,
            stop_after: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackRecord {
    pub name: String,
    pub from_step: bool,
    pub succeeded: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub success: bool,
    pub steps_processed: usize,
    /// Entries still on the stack, available for a manual retry.
    pub remaining: usize,
    pub nothing_to_undo: bool,
    pub stopped_at: Option<String>,
    pub records: Vec<RollbackRecord>,
    pub failures: Vec<CutoverError>,
    /// Restore points the operator may fall back to; never applied automatically.
    pub manual_fallback: Vec<RestorePoint>,
}

impl RollbackReport {
    pub fn processed_names(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|record| record.name.as_str())
            .collect()
    }
}

/// Drains the rollback stack by running compensations in reverse order.
#[derive(Debug, Default)]
pub struct RollbackExecutor {
    stack: RollbackStack,
}

impl RollbackExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(&self) -> &RollbackStack {
        &self.stack
    }

    pub(crate) fn push_step(&mut self, name: &str, index: usize, compensation: StepAction) {
        self.stack.push(RollbackEntry::Step {
            name: name.to_string(),
            index,
            compensation,
        });
    }

    pub fn register_action(
        &mut self,
        name: impl Into<String>,
        compensation: StepAction,
        priority: RollbackPriority,
    ) {
        self.stack.push(RollbackEntry::Standalone {
            name: name.into(),
            compensation,
            priority,
        });
    }

    /// Every popped entry is gone for good, whether its compensation worked
    /// or not. An empty stack reports `success = false` with nothing processed.
    pub fn execute(&mut self, options: &RollbackOptions) -> RollbackReport {
        if self.stack.is_empty() {
            info!("rollback requested with nothing to undo");
            return RollbackReport {
                nothing_to_undo: true,
                ..RollbackReport::default()
            };
        }

        info!(
            entries = self.stack.len(),
            force = options.force,
            stop_after = options.stop_after.as_deref().unwrap_or(""),
            "rollback started"
        );

        let mut report = RollbackReport::default();
        while let Some(mut entry) = self.stack.pop() {
            let name = entry.name().to_string();
            info!(entry = %name, priority = %entry.priority(), "compensating");
            let outcome = invoke(entry.compensation_mut());
            report.steps_processed += 1;

            match outcome {
                Ok(()) => report.records.push(RollbackRecord {
                    name: name.clone(),
                    from_step: entry.is_step(),
                    succeeded: true,
                    detail: None,
                }),
                Err(detail) => {
                    error!(entry = %name, error = %detail, "compensation failed");
                    report.records.push(RollbackRecord {
                        name: name.clone(),
                        from_step: entry.is_step(),
                        succeeded: false,
                        detail: Some(detail.clone()),
                    });
                    report.failures.push(CutoverError::Rollback {
                        entry: name.clone(),
                        detail,
                    });
                    if !options.force {
                        warn!(remaining = self.stack.len(), "rollback halted");
                        report.stopped_at = Some(name);
                        break;
                    }
                }
            }

            if options.stop_after.as_deref() == Some(name.as_str()) {
                info!(entry = %name, "partial rollback reached its stop point");
                report.stopped_at = Some(name);
                break;
            }
        }

        report.remaining = self.stack.len();
        report.success = report.failures.is_empty();
        info!(
            processed = report.steps_processed,
            failed = report.failures.len(),
            remaining = report.remaining,
            "rollback finished"
        );
        report
    }
}
