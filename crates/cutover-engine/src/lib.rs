mod command;
mod engine;
mod journal;
mod restore_point;
mod rollback;
mod step;

pub use command::command_action;
pub use engine::{Engine, RunReport, StepSummary};
pub use journal::{read_journal_entries, JournalEntry, RunJournal};
pub use restore_point::{RestorePointBridge, RestorePointProvider, SystemRestore};
pub use rollback::{
    RollbackEntry, RollbackExecutor, RollbackOptions, RollbackPriority, RollbackRecord,
    RollbackReport, RollbackStack,
};
pub use step::{action, Step, StepAction, StepRegistry};
