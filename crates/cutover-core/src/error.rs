use thiserror::Error;

/// Failure classes surfaced at the public boundaries of the orchestrator.
///
/// Only `Initialization` is ever returned as a hard error; the others are
/// carried inside reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CutoverError {
    #[error("initialization failed: {0}")]
    Initialization(String),
    #[error("step '{step}' failed: {detail}")]
    StepExecution { step: String, detail: String },
    #[error("rollback of '{entry}' failed: {detail}")]
    Rollback { entry: String, detail: String },
    #[error("backup '{component}' failed integrity check: {detail}")]
    BackupIntegrity { component: String, detail: String },
    #[error("restoration validation failed: {0}")]
    Validation(String),
}
