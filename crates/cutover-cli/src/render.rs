use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use cutover_backup::{CleanupReport, RestoreReport, ValidationReport};
use cutover_core::{Backup, RunStatus, StepStatus};
use cutover_engine::{RollbackReport, RunReport};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

pub(crate) fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

pub(crate) fn print_section(style: OutputStyle, title: &str) {
    if let Some(line) = render_section_header(style, title) {
        println!();
        println!("{line}");
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

pub(crate) fn format_run_report_lines(report: &RunReport, style: OutputStyle) -> Vec<String> {
    let mut lines = Vec::new();
    for step in &report.steps {
        let (status, message) = match step.status {
            StepStatus::Completed => ("ok", format!("step {} ({}): completed", step.name, step.phase)),
            StepStatus::Failed => {
                let detail = step.error_detail.as_deref().unwrap_or("unknown error");
                let status = if report.failed_step.as_deref() == Some(step.name.as_str()) {
                    "err"
                } else {
                    "warn"
                };
                (
                    status,
                    format!("step {} ({}): failed: {detail}", step.name, step.phase),
                )
            }
            StepStatus::Pending | StepStatus::Running => {
                ("info", format!("step {} ({}): not run", step.name, step.phase))
            }
        };
        lines.push(render_status_line(style, status, &message));
    }

    if let Some(error) = report.error.as_ref().filter(|_| report.failed_step.is_none()) {
        lines.push(render_status_line(style, "err", &error.to_string()));
    }

    if let Some(rollback) = &report.rollback {
        lines.extend(format_rollback_lines(rollback, style));
    }

    for point in &report.restore_points {
        lines.push(render_status_line(
            style,
            "info",
            &format!(
                "restore point: '{}' created {}",
                point.description,
                point.creation_time.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ));
    }

    let status = match report.status {
        RunStatus::Completed if report.has_warnings() => "warn",
        RunStatus::Completed | RunStatus::RolledBack => "ok",
        _ => "err",
    };
    lines.push(render_status_line(
        style,
        status,
        &format!("run {}: {}", report.run_id, report.outcome_label()),
    ));
    lines
}

pub(crate) fn format_rollback_lines(report: &RollbackReport, style: OutputStyle) -> Vec<String> {
    if report.nothing_to_undo {
        return vec![render_status_line(style, "info", "rollback: nothing to undo")];
    }

    let mut lines = Vec::new();
    for record in report.records.iter().filter(|record| !record.succeeded) {
        lines.push(render_status_line(
            style,
            "err",
            &format!(
                "compensation {} failed: {}",
                record.name,
                record.detail.as_deref().unwrap_or("unknown error")
            ),
        ));
    }
    lines.push(render_status_line(
        style,
        if report.success { "ok" } else { "err" },
        &format!(
            "rollback: {} compensated, {} failed, {} remaining",
            report.steps_processed - report.failures.len(),
            report.failures.len(),
            report.remaining
        ),
    ));
    for point in &report.manual_fallback {
        lines.push(render_status_line(
            style,
            "warn",
            &format!(
                "manual fallback: restore point '{}' from {}",
                point.description,
                point.creation_time.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ));
    }
    lines
}

pub(crate) fn format_backup_line(backup: &Backup) -> String {
    format!(
        "{} {} [{}] {} files, {} bytes ({}) {}",
        backup.creation_time.format("%Y-%m-%d %H:%M:%S"),
        backup.component,
        backup.status,
        backup.file_count,
        backup.size_bytes,
        backup.migration_run_id,
        backup.backup_path.display()
    )
}

pub(crate) fn format_restore_lines(report: &RestoreReport, style: OutputStyle) -> Vec<String> {
    let mut lines = report
        .items
        .iter()
        .map(|item| {
            let mut message = if item.restored {
                format!("restored {} ({})", item.source, item.kind)
            } else {
                format!(
                    "failed to restore {} ({}): {}",
                    item.source,
                    item.kind,
                    item.detail.as_deref().unwrap_or("unknown error")
                )
            };
            if let Some(path) = &item.pre_restore_path {
                message.push_str(&format!("; previous copy kept at {}", path.display()));
            }
            render_status_line(style, if item.restored { "ok" } else { "err" }, &message)
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "restored={} failed={}",
        report.restored_count, report.failed_count
    ));
    lines
}

pub(crate) fn format_validation_lines(
    report: &ValidationReport,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = report
        .details
        .iter()
        .map(|item| {
            render_status_line(
                style,
                if item.valid { "ok" } else { "err" },
                &format!("{} ({}): {}", item.source, item.kind, item.detail),
            )
        })
        .collect::<Vec<_>>();
    lines.push(format!(
        "valid={} invalid={}",
        report.valid_items, report.invalid_items
    ));
    lines
}

pub(crate) fn format_cleanup_lines(report: &CleanupReport, style: OutputStyle) -> Vec<String> {
    let mut lines = report
        .removed
        .iter()
        .map(|path| render_status_line(style, "ok", &format!("removed {}", path.display())))
        .collect::<Vec<_>>();
    lines.push(format!(
        "removed={} kept={}",
        report.removed.len(),
        report.kept
    ));
    lines
}
