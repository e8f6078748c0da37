use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use cutover_core::run_command;

/// Registry exports shorter than this cannot hold the editor header plus a key.
pub const MIN_REGISTRY_EXPORT_BYTES: u64 = 100;

/// Seam over the platform registry import/export facility.
pub trait RegistryTool {
    fn export_key(&self, key: &str, dest: &Path) -> Result<()>;
    fn import_file(&self, path: &Path) -> Result<()>;
    fn key_exists(&self, key: &str) -> Result<bool>;
}

/// Shells out to `reg.exe`.
#[derive(Debug, Clone)]
pub struct RegExe {
    program: PathBuf,
}

impl Default for RegExe {
    fn default() -> Self {
        Self {
            program: PathBuf::from("reg"),
        }
    }
}

impl RegExe {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }
}

impl RegistryTool for RegExe {
    fn export_key(&self, key: &str, dest: &Path) -> Result<()> {
        let mut command = self.command();
        command.arg("export").arg(key).arg(dest).arg("/y");
        run_command(&mut command, &format!("reg export failed for '{key}'"))
    }

    fn import_file(&self, path: &Path) -> Result<()> {
        let mut command = self.command();
        command.arg("import").arg(path);
        run_command(
            &mut command,
            &format!("reg import failed for {}", path.display()),
        )
    }

    fn key_exists(&self, key: &str) -> Result<bool> {
        let status = self
            .command()
            .arg("query")
            .arg(key)
            .output()
            .with_context(|| format!("reg query failed to start for '{key}'"))?
            .status;
        Ok(status.success())
    }
}
