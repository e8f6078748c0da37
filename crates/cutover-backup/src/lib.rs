mod catalog;
mod fs_utils;
mod manifest;
mod registry;
mod report;
mod store;

pub use catalog::{cleanup_backups, list_backups, load_backup};
pub use manifest::{read_manifest, write_manifest};
pub use registry::{RegExe, RegistryTool, MIN_REGISTRY_EXPORT_BYTES};
pub use report::{
    CleanupReport, IntegrityCheck, ItemValidation, RestoreItemOutcome, RestoreReport,
    ValidationReport,
};
pub use store::BackupStore;

#[cfg(test)]
mod tests;
