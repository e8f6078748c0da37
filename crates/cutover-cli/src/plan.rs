use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use cutover_backup::BackupStore;
use cutover_core::{Backup, BackupSource, Phase, RestoreFilter};
use cutover_engine::{action, command_action, Engine, RollbackPriority, Step, StepAction};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default, rename = "step")]
    steps: Vec<RawStep>,
    #[serde(default, rename = "rollback")]
    rollback_actions: Vec<RawRollbackAction>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStep {
    name: String,
    phase: String,
    run: Vec<String>,
    #[serde(default)]
    compensate: Option<Vec<String>>,
    #[serde(default)]
    continue_on_error: bool,
    #[serde(default)]
    backup: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRollbackAction {
    name: String,
    run: Vec<String>,
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedStep {
    pub(crate) name: String,
    pub(crate) phase: Phase,
    pub(crate) run: Vec<String>,
    pub(crate) compensate: Option<Vec<String>>,
    pub(crate) continue_on_error: bool,
    pub(crate) backup: Vec<BackupSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedRollbackAction {
    pub(crate) name: String,
    pub(crate) run: Vec<String>,
    pub(crate) priority: RollbackPriority,
}

/// Validated contents of a plan file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MigrationPlan {
    pub(crate) steps: Vec<PlannedStep>,
    pub(crate) rollback_actions: Vec<PlannedRollbackAction>,
}

impl MigrationPlan {
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid plan file: {}", path.display()))
    }

    pub(crate) fn from_toml_str(input: &str) -> Result<Self> {
        let raw: RawPlan = toml::from_str(input).context("failed to parse plan TOML")?;
        if raw.steps.is_empty() {
            return Err(anyhow!("plan must declare at least one [[step]]"));
        }

        let mut names = HashSet::new();
        let mut steps = Vec::with_capacity(raw.steps.len());
        for step in raw.steps {
            let name = step.name.trim().to_string();
            if name.is_empty() {
                return Err(anyhow!("step name must not be empty"));
            }
            if !names.insert(name.clone()) {
                return Err(anyhow!("duplicate step name in plan: {name}"));
            }
            let phase =
                Phase::parse(&step.phase).with_context(|| format!("step '{name}' phase"))?;
            ensure_argv(&step.run, &name, "run")?;
            if let Some(compensate) = &step.compensate {
                ensure_argv(compensate, &name, "compensate")?;
            }

            steps.push(PlannedStep {
                name,
                phase,
                run: step.run,
                compensate: step.compensate,
                continue_on_error: step.continue_on_error,
                backup: step
                    .backup
                    .iter()
                    .map(|source| BackupSource::parse(source))
                    .collect(),
            });
        }

        let mut rollback_actions = Vec::with_capacity(raw.rollback_actions.len());
        for entry in raw.rollback_actions {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(anyhow!("rollback action name must not be empty"));
            }
            ensure_argv(&entry.run, &name, "run")?;
            let priority = match entry.priority.as_deref() {
                Some(value) => parse_priority(value)?,
                None => RollbackPriority::default(),
            };
            rollback_actions.push(PlannedRollbackAction {
                name,
                run: entry.run,
                priority,
            });
        }

        Ok(Self {
            steps,
            rollback_actions,
        })
    }

    /// Registers rollback actions first so they sit beneath every step
    /// compensation and run last.
    pub(crate) fn register(&self, engine: &mut Engine) -> Result<()> {
        for entry in &self.rollback_actions {
            engine.register_rollback_action(
                entry.name.clone(),
                command_action(entry.run.clone()),
                entry.priority,
            );
        }

        let store = engine.backup_store();
        for planned in &self.steps {
            if !engine.register_step(build_step(planned, &store)) {
                return Err(anyhow!("duplicate step name: {}", planned.name));
            }
        }
        info!(
            steps = self.steps.len(),
            rollback_actions = self.rollback_actions.len(),
            "plan registered"
        );
        Ok(())
    }
}

fn ensure_argv(argv: &[String], name: &str, field: &str) -> Result<()> {
    match argv.first() {
        Some(program) if !program.trim().is_empty() => Ok(()),
        _ => Err(anyhow!("'{name}' {field} command must not be empty")),
    }
}

pub(crate) fn parse_priority(value: &str) -> Result<RollbackPriority> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" => Ok(RollbackPriority::Low),
        "normal" => Ok(RollbackPriority::Normal),
        "high" => Ok(RollbackPriority::High),
        "critical" => Ok(RollbackPriority::Critical),
        _ => Err(anyhow!("invalid rollback priority: {value}")),
    }
}

/// Steps with `backup` sources capture and validate them before running the
/// command. Without an explicit `compensate` command their compensation is a
/// forced restore of that capture.
pub(crate) fn build_step(planned: &PlannedStep, store: &BackupStore) -> Step {
    let captured: Rc<RefCell<Option<Backup>>> = Rc::new(RefCell::new(None));

    let body = if planned.backup.is_empty() {
        command_action(planned.run.clone())
    } else {
        capture_then_run(planned, store.clone(), captured.clone())
    };

    let mut step = Step::new(planned.name.clone(), planned.phase, body)
        .continue_on_error(planned.continue_on_error);
    if let Some(compensate) = &planned.compensate {
        step = step.compensate_with(command_action(compensate.clone()));
    } else if !planned.backup.is_empty() {
        step = step.compensate_with(restore_captured(store.clone(), captured));
    }
    step
}

fn capture_then_run(
    planned: &PlannedStep,
    store: BackupStore,
    captured: Rc<RefCell<Option<Backup>>>,
) -> StepAction {
    let component = planned.name.clone();
    let sources = planned.backup.clone();
    let mut command = command_action(planned.run.clone());
    action(move || {
        let mut backup = store.create_backup(&component, &sources)?;
        if !store.validate_integrity(&mut backup) {
            return Err(anyhow!(
                "backup of '{component}' failed integrity validation: {}",
                backup.backup_path.display()
            ));
        }
        *captured.borrow_mut() = Some(backup);
        command()
    })
}

fn restore_captured(store: BackupStore, captured: Rc<RefCell<Option<Backup>>>) -> StepAction {
    action(move || {
        let mut slot = captured.borrow_mut();
        let backup = slot
            .as_mut()
            .ok_or_else(|| anyhow!("no backup was captured for this step"))?;
        let report = store.restore(backup, RestoreFilter::All, true)?;
        if report.failed_count > 0 {
            return Err(anyhow!(
                "{} of {} items failed to restore",
                report.failed_count,
                report.failed_count + report.restored_count
            ));
        }
        Ok(())
    })
}
