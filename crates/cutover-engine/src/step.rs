use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use cutover_core::{Phase, StepStatus};

/// Body of a step or of a compensation: no arguments, success or error.
pub type StepAction = Box<dyn FnMut() -> anyhow::Result<()>>;

pub fn action<F>(body: F) -> StepAction
where
    F: FnMut() -> anyhow::Result<()> + 'static,
{
    Box::new(body)
}

/// A named unit of migration work.
pub struct Step {
    name: String,
    phase: Phase,
    action: StepAction,
    /// Moved onto the rollback stack when the step completes.
    compensation: Option<StepAction>,
    /// Set at registration and never cleared, so it still answers after
    /// `compensation` has been taken.
    compensable: bool,
    continue_on_error: bool,
    pub(crate) status: StepStatus,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
    pub(crate) error_detail: Option<String>,
}

impl Step {
    pub fn new(name: impl Into<String>, phase: Phase, action: StepAction) -> Self {
        Self {
            name: name.into(),
            phase,
            action,
            compensation: None,
            compensable: false,
            continue_on_error: false,
            status: StepStatus::Pending,
            start_time: None,
            end_time: None,
            error_detail: None,
        }
    }

    pub fn compensate_with(mut self, compensation: StepAction) -> Self {
        self.compensation = Some(compensation);
        self.compensable = true;
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the step was registered with a compensating action. Stays true
    /// after the compensation moves onto the rollback stack.
    pub fn is_compensable(&self) -> bool {
        self.compensable
    }

    pub fn continues_on_error(&self) -> bool {
        self.continue_on_error
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub(crate) fn execute(&mut self) -> Result<(), String> {
        invoke(&mut self.action)
    }

    pub(crate) fn take_compensation(&mut self) -> Option<StepAction> {
        self.compensation.take()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("phase", &self.phase)
            .field("compensable", &self.compensable)
            .field("continue_on_error", &self.continue_on_error)
            .field("status", &self.status)
            .field("error_detail", &self.error_detail)
            .finish_non_exhaustive()
    }
}

/// Append-only, name-unique list of steps in registration order.
#[derive(Debug, Default)]
pub struct StepRegistry {
    steps: Vec<Step>,
    by_name: HashMap<String, usize>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false and drops the step when the name is already taken.
    pub fn register(&mut self, step: Step) -> bool {
        if self.by_name.contains_key(step.name()) {
            return false;
        }
        self.by_name.insert(step.name().to_string(), self.steps.len());
        self.steps.push(step);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Step> {
        self.by_name.get(name).map(|index| &self.steps[*index])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub(crate) fn step_mut(&mut self, index: usize) -> &mut Step {
        &mut self.steps[index]
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Runs an action, turning both errors and panics into a message.
pub(crate) fn invoke(action: &mut StepAction) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| action())) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(format!("{err:#}")),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic payload".to_string()
}
