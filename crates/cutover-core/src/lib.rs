mod backup;
mod config;
mod error;
mod layout;
mod phase;
mod process;
mod run;

pub use backup::{
    Backup, BackupItem, BackupItemKind, BackupSource, BackupStatus, RestoreFilter,
};
pub use config::RunConfig;
pub use error::CutoverError;
pub use layout::{default_root, CutoverLayout};
pub use phase::Phase;
pub use process::{escape_ps_single_quote, run_command};
pub use run::{
    generate_run_id, MigrationRun, RestorePoint, RestorePointKind, RunStatus, StepStatus,
};

#[cfg(test)]
mod tests;
