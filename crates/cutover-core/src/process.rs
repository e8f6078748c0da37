use std::process::Command;

use anyhow::{anyhow, Context, Result};

/// Runs `command` to completion; a non-zero exit becomes an error carrying
/// both output streams.
pub fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

pub fn escape_ps_single_quote(value: &str) -> String {
    value.replace('\'', "''")
}
