use std::process::Command;

use anyhow::anyhow;
use cutover_core::run_command;
use tracing::debug;

use crate::step::StepAction;

/// Step body that runs an external program; a non-zero exit is a step error.
pub fn command_action(argv: Vec<String>) -> StepAction {
    Box::new(move || {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("step command must not be empty"))?;
        debug!(program = %program, args = ?args, "running step command");
        let mut command = Command::new(program);
        command.args(args);
        run_command(&mut command, &format!("command '{program}' failed"))
    })
}
