mod dispatch;
mod logging;
mod plan;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use cutover_core::RestoreFilter;

#[derive(Parser, Debug)]
#[command(name = "cutover")]
#[command(about = "Transactional device migration orchestrator", long_about = None)]
struct Cli {
    /// State root holding `backups/` and `logs/`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a migration plan, rolling back on failure.
    Run {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Request a System Restore checkpoint before the first step.
        #[arg(long)]
        restore_point: bool,
    },
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },
    RestorePoint {
        #[command(subcommand)]
        command: RestorePointCommands,
    },
    Doctor,
}

#[derive(Subcommand, Debug)]
enum BackupCommands {
    Create {
        component: String,
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        #[arg(long)]
        run_id: Option<String>,
    },
    Validate {
        path: PathBuf,
    },
    Restore {
        path: PathBuf,
        #[arg(long, value_enum, default_value_t = RestoreScope::All)]
        only: RestoreScope,
        /// Replace existing files, keeping them as `*.pre_restore`.
        #[arg(long)]
        force: bool,
    },
    /// Check restored items at their original locations.
    Verify {
        path: PathBuf,
    },
    List {
        #[arg(long)]
        run_id: Option<String>,
    },
    Cleanup {
        #[arg(long)]
        max_age_days: u32,
    },
}

#[derive(Subcommand, Debug)]
enum RestorePointCommands {
    Create {
        #[arg(long, default_value = "Cutover checkpoint")]
        description: String,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum RestoreScope {
    Registry,
    Files,
    All,
}

impl From<RestoreScope> for RestoreFilter {
    fn from(scope: RestoreScope) -> Self {
        match scope {
            RestoreScope::Registry => RestoreFilter::Registry,
            RestoreScope::Files => RestoreFilter::Files,
            RestoreScope::All => RestoreFilter::All,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}
