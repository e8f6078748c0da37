use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use cutover_backup::{BackupStore, RegistryTool};
use cutover_core::{
    CutoverError, CutoverLayout, MigrationRun, Phase, RestorePoint, RunConfig, RunStatus,
    StepStatus,
};
use tracing::{error, info, warn};

use crate::journal::RunJournal;
use crate::restore_point::{RestorePointBridge, RestorePointProvider};
use crate::rollback::{
    RollbackExecutor, RollbackOptions, RollbackPriority, RollbackReport, RollbackStack,
};
use crate::step::{Step, StepAction, StepRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary {
    pub name: String,
    pub phase: Phase,
    pub status: StepStatus,
    pub error_detail: Option<String>,
}

/// Terminal outcome of `Engine::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// The run failed and every completed compensable step was undone.
    pub rolled_back: bool,
    pub failed_step: Option<String>,
    pub error: Option<CutoverError>,
    /// Failures of continue-on-error steps.
    pub warnings: Vec<CutoverError>,
    pub steps: Vec<StepSummary>,
    pub rollback: Option<RollbackReport>,
    pub restore_points: Vec<RestorePoint>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn outcome_label(&self) -> &'static str {
        match (self.status, self.rolled_back, self.has_warnings()) {
            (RunStatus::Completed, _, false) => "completed",
            (RunStatus::Completed, _, true) => "completed_with_warnings",
            (RunStatus::Failed, true, _) => "failed_rolled_back",
            (RunStatus::RolledBack, _, _) => "rolled_back",
            _ => "failed",
        }
    }
}

/// Drives one migration run: steps in registration order, compensations in
/// reverse completion order.
pub struct Engine {
    run: MigrationRun,
    layout: CutoverLayout,
    registry: StepRegistry,
    rollback: RollbackExecutor,
    restore_points: RestorePointBridge,
    backup_store: BackupStore,
    journal: RunJournal,
}

impl Engine {
    /// Starts a new run. Only directory creation can fail here; a missing
    /// configuration falls back to an empty one.
    pub fn init(
        config: Option<RunConfig>,
        backup_location: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
    ) -> Result<Self, CutoverError> {
        let layout = CutoverLayout::new(backup_location, log_path);
        layout
            .ensure_base_dirs()
            .map_err(|err| CutoverError::Initialization(format!("{err:#}")))?;

        let config = config.unwrap_or_else(|| {
            warn!("no run configuration supplied; using an empty configuration");
            RunConfig::new()
        });
        let mut run = MigrationRun::new(
            Utc::now(),
            config,
            layout.backup_location().to_path_buf(),
            layout.log_path().to_path_buf(),
        );
        run.id = layout
            .claim_run_id(&run.id)
            .map_err(|err| CutoverError::Initialization(format!("{err:#}")))?;

        let journal = RunJournal::new(&layout, &run.id);
        journal.record_run(&run);
        info!(
            run_id = %run.id,
            backup_location = %layout.backup_location().display(),
            log_path = %layout.log_path().display(),
            "migration run initialized"
        );

        Ok(Self {
            backup_store: BackupStore::new(layout.clone(), run.id.clone()),
            run,
            layout,
            registry: StepRegistry::new(),
            rollback: RollbackExecutor::new(),
            restore_points: RestorePointBridge::default(),
            journal,
        })
    }

    pub fn with_restore_point_provider(mut self, provider: Box<dyn RestorePointProvider>) -> Self {
        self.restore_points = RestorePointBridge::new(provider);
        self
    }

    pub fn with_registry_tool(mut self, registry: Arc<dyn RegistryTool>) -> Self {
        self.backup_store = self.backup_store.with_registry_tool(registry);
        self
    }

    pub fn run_info(&self) -> &MigrationRun {
        &self.run
    }

    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }

    pub fn layout(&self) -> &CutoverLayout {
        &self.layout
    }

    pub fn steps(&self) -> &[Step] {
        self.registry.steps()
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.registry.get(name)
    }

    pub fn rollback_stack(&self) -> &RollbackStack {
        self.rollback.stack()
    }

    pub fn restore_points(&self) -> &[RestorePoint] {
        self.restore_points.points()
    }

    /// Handle bound to this run for step bodies to capture.
    pub fn backup_store(&self) -> BackupStore {
        self.backup_store.clone()
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    /// Appends a step. Duplicate names are rejected with `false`.
    ///
    /// # Panics
    ///
    /// Registering once the run has finished is a caller bug and panics.
    pub fn register_step(&mut self, step: Step) -> bool {
        assert!(
            !self.run.status.is_terminal(),
            "cannot register step '{}' after run {} finished",
            step.name(),
            self.run.id
        );

        let name = step.name().to_string();
        let phase = step.phase();
        if !self.registry.register(step) {
            warn!(run_id = %self.run.id, step = %name, "duplicate step name rejected");
            return false;
        }
        info!(run_id = %self.run.id, step = %name, phase = %phase, "step registered");
        self.journal.append("step", &name, "registered", None);
        true
    }

    /// Pushes a compensation that is not tied to any step.
    pub fn register_rollback_action(
        &mut self,
        name: impl Into<String>,
        compensation: StepAction,
        priority: RollbackPriority,
    ) {
        let name = name.into();
        info!(
            run_id = %self.run.id,
            entry = %name,
            priority = %priority,
            "rollback action registered"
        );
        self.journal.append("rollback_action", &name, "registered", None);
        self.rollback.register_action(name, compensation, priority);
    }

    /// Executes every registered step once, in registration order.
    ///
    /// Never panics or errors because of a step; the outcome is always a
    /// report. A failed step without `continue_on_error` triggers a rollback
    /// of the current stack and ends the run as `Failed`.
    pub fn run(&mut self, use_system_restore_point: bool) -> RunReport {
        if self.run.status != RunStatus::NotStarted {
            let error = CutoverError::Initialization(format!(
                "run {} already {}",
                self.run.id, self.run.status
            ));
            warn!(run_id = %self.run.id, "{error}");
            let mut report = self.build_report(Some(error), Vec::new(), None, None);
            report.status = RunStatus::Failed;
            return report;
        }

        if self.registry.is_empty() {
            let error = CutoverError::Initialization("no steps registered".to_string());
            error!(run_id = %self.run.id, "{error}");
            self.finish(RunStatus::Failed);
            return self.build_report(Some(error), Vec::new(), None, None);
        }

        self.run.status = RunStatus::Running;
        self.journal.record_run(&self.run);
        info!(run_id = %self.run.id, steps = self.registry.len(), "migration run started");

        if use_system_restore_point {
            let description = format!("Before migration {}", self.run.id);
            let created = self.restore_points.create(&description);
            self.run.restore_points = self.restore_points.points().to_vec();
            self.journal.append(
                "restore_point",
                &description,
                if created { "created" } else { "unavailable" },
                None,
            );
        }

        let mut warnings = Vec::new();
        for index in 0..self.registry.len() {
            let step = self.registry.step_mut(index);
            let name = step.name().to_string();
            let phase = step.phase();

            match self.run.current_phase {
                Some(current) if current == phase => {}
                Some(current) if phase < current => {
                    warn!(
                        run_id = %self.run.id,
                        from = %current,
                        to = %phase,
                        step = %name,
                        "phase regression; steps run in registration order"
                    );
                    self.run.current_phase = Some(phase);
                }
                _ => {
                    info!(run_id = %self.run.id, phase = %phase, "entering phase");
                    self.run.current_phase = Some(phase);
                }
            }

            step.status = StepStatus::Running;
            step.start_time = Some(Utc::now());
            self.journal.append("step", &name, "running", None);
            info!(run_id = %self.run.id, step = %name, phase = %phase, "step started");

            let outcome = step.execute();
            step.end_time = Some(Utc::now());

            match outcome {
                Ok(()) => {
                    step.status = StepStatus::Completed;
                    let compensation = step.take_compensation();
                    self.journal.append("step", &name, "completed", None);
                    info!(run_id = %self.run.id, step = %name, "step completed");
                    if let Some(compensation) = compensation {
                        self.rollback.push_step(&name, index, compensation);
                    }
                }
                Err(detail) => {
                    step.status = StepStatus::Failed;
                    step.error_detail = Some(detail.clone());
                    let continue_on_error = step.continues_on_error();
                    self.journal.append("step", &name, "failed", Some(&detail));
                    error!(run_id = %self.run.id, step = %name, error = %detail, "step failed");

                    let failure = CutoverError::StepExecution {
                        step: name.clone(),
                        detail,
                    };
                    if continue_on_error {
                        warn!(run_id = %self.run.id, step = %name, "continuing after step failure");
                        warnings.push(failure);
                        continue;
                    }

                    let mut rollback = self.execute_rollback(&RollbackOptions::default());
                    if !rollback.success {
                        rollback.manual_fallback = self.restore_points.points().to_vec();
                    }
                    self.run.rolled_back = rollback.success;
                    self.finish(RunStatus::Failed);
                    return self.build_report(Some(failure), warnings, Some(name), Some(rollback));
                }
            }
        }

        self.finish(RunStatus::Completed);
        if !warnings.is_empty() {
            warn!(
                run_id = %self.run.id,
                failed_steps = warnings.len(),
                "migration run completed with warnings"
            );
        }
        self.build_report(None, warnings, None, None)
    }

    /// Operator-initiated rollback of whatever is left on the stack.
    ///
    /// A full rollback of a non-empty stack after the run ended marks the run
    /// `RolledBack`.
    pub fn rollback(&mut self, options: RollbackOptions) -> RollbackReport {
        let mut report = self.execute_rollback(&options);
        if !report.success {
            report.manual_fallback = self.restore_points.points().to_vec();
        }
        if report.success && report.remaining == 0 && self.run.status.is_terminal() {
            self.run.rolled_back = true;
            self.run.status = RunStatus::RolledBack;
        }
        self.journal.record_run(&self.run);
        report
    }

    fn execute_rollback(&mut self, options: &RollbackOptions) -> RollbackReport {
        self.journal.append("rollback", &self.run.id, "started", None);
        let report = self.rollback.execute(options);
        for record in &report.records {
            let state = if record.succeeded { "compensated" } else { "failed" };
            self.journal.append("compensation", &record.name, state, record.detail.as_deref());
        }
        let state = match (report.nothing_to_undo, report.success) {
            (true, _) => "nothing_to_undo",
            (false, true) => "finished",
            (false, false) => "halted",
        };
        self.journal.append("rollback", &self.run.id, state, None);
        report
    }

    fn finish(&mut self, status: RunStatus) {
        self.run.status = status;
        self.run.end_time = Some(Utc::now());
        self.journal.record_run(&self.run);
        info!(
            run_id = %self.run.id,
            status = %status,
            rolled_back = self.run.rolled_back,
            "migration run finished"
        );
    }

    fn build_report(
        &self,
        error: Option<CutoverError>,
        warnings: Vec<CutoverError>,
        failed_step: Option<String>,
        rollback: Option<RollbackReport>,
    ) -> RunReport {
        RunReport {
            run_id: self.run.id.clone(),
            status: self.run.status,
            rolled_back: self.run.rolled_back,
            failed_step,
            error,
            warnings,
            steps: self
                .registry
                .steps()
                .iter()
                .map(|step| StepSummary {
                    name: step.name().to_string(),
                    phase: step.phase(),
                    status: step.status(),
                    error_detail: step.error_detail().map(ToOwned::to_owned),
                })
                .collect(),
            rollback,
            restore_points: self.restore_points.points().to_vec(),
        }
    }
}
