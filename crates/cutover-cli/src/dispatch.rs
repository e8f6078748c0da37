use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use cutover_backup::{cleanup_backups, list_backups, load_backup, BackupStore};
use cutover_core::{
    default_root, generate_run_id, BackupSource, BackupStatus, CutoverLayout, RunConfig,
};
use cutover_engine::{Engine, RestorePointBridge};
use tracing::info;

use crate::logging::init_logging;
use crate::plan::MigrationPlan;
use crate::render::{
    current_output_style, format_backup_line, format_cleanup_lines, format_restore_lines,
    format_run_report_lines, format_validation_lines, print_lines, print_section,
    render_status_line,
};
use crate::{BackupCommands, Cli, Commands, RestorePointCommands};

pub(crate) const BACKUP_DIR_ENV: &str = "CUTOVER_BACKUP_DIR";
pub(crate) const LOG_DIR_ENV: &str = "CUTOVER_LOG_DIR";

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let layout = resolve_layout(cli.root.as_deref())?;
    let log = init_logging(&layout);
    if let Some(path) = log.path() {
        info!(log_file = %path.display(), "logging initialized");
    }
    let style = current_output_style();

    match cli.command {
        Commands::Run {
            plan,
            config,
            restore_point,
        } => {
            let plan = MigrationPlan::load(&plan)?;
            let config = config
                .as_deref()
                .map(RunConfig::load)
                .transpose()?;
            let mut engine = Engine::init(config, layout.backup_location(), layout.log_path())?;
            plan.register(&mut engine)?;

            print_section(style, &format!("run {}", engine.run_id()));
            let report = engine.run(restore_point);
            print_lines(&format_run_report_lines(&report, style));
            if !report.is_success() {
                return Err(anyhow!(
                    "migration run {} {}",
                    report.run_id,
                    report.outcome_label()
                ));
            }
        }
        Commands::Backup { command } => run_backup_command(&layout, command)?,
        Commands::RestorePoint {
            command: RestorePointCommands::Create { description },
        } => {
            let mut bridge = RestorePointBridge::default();
            if !bridge.create(&description) {
                return Err(anyhow!("restore point '{description}' could not be created"));
            }
            println!(
                "{}",
                render_status_line(style, "ok", &format!("restore point '{description}' created"))
            );
        }
        Commands::Doctor => {
            println!("backups: {}", layout.backup_location().display());
            println!("logs: {}", layout.log_path().display());
            if let Some(path) = log.path() {
                println!("log file: {}", path.display());
            }
            println!(
                "system restore: {}",
                if cfg!(windows) {
                    "supported"
                } else {
                    "unsupported on this platform"
                }
            );
            let backups = list_backups(layout.backup_location(), None)?;
            println!("backups on disk: {}", backups.len());
        }
    }

    Ok(())
}

fn run_backup_command(layout: &CutoverLayout, command: BackupCommands) -> Result<()> {
    let style = current_output_style();
    match command {
        BackupCommands::Create {
            component,
            sources,
            run_id,
        } => {
            layout.ensure_base_dirs()?;
            let run_id = run_id.unwrap_or_else(|| generate_run_id(Utc::now()));
            let store = BackupStore::new(layout.clone(), run_id);
            let sources = sources
                .iter()
                .map(|source| BackupSource::parse(source))
                .collect::<Vec<_>>();
            let mut backup = store.create_backup(&component, &sources)?;
            let check = store.check_integrity(&backup);
            store.validate_integrity(&mut backup);

            println!("{}", format_backup_line(&backup));
            for problem in &check.problems {
                println!("{}", render_status_line(style, "err", problem));
            }
            if !check.valid {
                return Err(anyhow!("backup '{component}' failed integrity validation"));
            }
        }
        BackupCommands::Validate { path } => {
            let (store, mut backup) = open_backup(layout, &path)?;
            let check = store.check_integrity(&backup);
            store.validate_integrity(&mut backup);
            for problem in &check.problems {
                println!("{}", render_status_line(style, "err", problem));
            }
            println!("{}", format_backup_line(&backup));
            if !check.valid {
                return Err(anyhow!(
                    "backup failed integrity validation: {}",
                    backup.backup_path.display()
                ));
            }
        }
        BackupCommands::Restore { path, only, force } => {
            let (store, mut backup) = open_backup(layout, &path)?;
            if !matches!(
                backup.status,
                BackupStatus::Validated | BackupStatus::Restored
            ) && !store.validate_integrity(&mut backup)
            {
                return Err(anyhow!(
                    "backup failed integrity validation: {}",
                    backup.backup_path.display()
                ));
            }
            let report = store.restore(&mut backup, only.into(), force)?;
            print_lines(&format_restore_lines(&report, style));
            if report.failed_count > 0 {
                return Err(anyhow!("{} items failed to restore", report.failed_count));
            }
        }
        BackupCommands::Verify { path } => {
            let (store, backup) = open_backup(layout, &path)?;
            let report = store.test_restoration_validity(&backup);
            print_lines(&format_validation_lines(&report, style));
            if let Some(err) = report.as_error() {
                return Err(err.into());
            }
        }
        BackupCommands::List { run_id } => {
            let backups = list_backups(layout.backup_location(), run_id.as_deref())?;
            if backups.is_empty() {
                println!("No backups found");
            }
            for backup in &backups {
                println!("{}", format_backup_line(backup));
            }
        }
        BackupCommands::Cleanup { max_age_days } => {
            let report = cleanup_backups(
                layout.backup_location(),
                Duration::days(i64::from(max_age_days)),
                Utc::now(),
            )?;
            print_lines(&format_cleanup_lines(&report, style));
        }
    }
    Ok(())
}

fn open_backup(layout: &CutoverLayout, path: &Path) -> Result<(BackupStore, cutover_core::Backup)> {
    let backup = load_backup(path)
        .with_context(|| format!("failed to open backup: {}", path.display()))?;
    let store = BackupStore::new(layout.clone(), backup.migration_run_id.clone());
    Ok((store, backup))
}

pub(crate) fn resolve_layout(root: Option<&Path>) -> Result<CutoverLayout> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => default_root()?,
    };
    Ok(layout_with_overrides(
        root,
        env_path(BACKUP_DIR_ENV),
        env_path(LOG_DIR_ENV),
    ))
}

pub(crate) fn layout_with_overrides(
    root: PathBuf,
    backup_location: Option<PathBuf>,
    log_path: Option<PathBuf>,
) -> CutoverLayout {
    let base = CutoverLayout::from_root(root);
    CutoverLayout::new(
        backup_location.unwrap_or_else(|| base.backup_location().to_path_buf()),
        log_path.unwrap_or_else(|| base.log_path().to_path_buf()),
    )
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
