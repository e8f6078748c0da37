use super::*;
use chrono::TimeZone;
use std::path::{Path, PathBuf};

#[test]
fn phase_parse_accepts_any_case() {
    assert_eq!(Phase::parse("Preparation").expect("must parse"), Phase::Preparation);
    assert_eq!(Phase::parse(" cleanup ").expect("must parse"), Phase::Cleanup);
    assert!(Phase::parse("teardown").is_err());
}

#[test]
fn phase_order_follows_migration_sequence() {
    assert!(Phase::Preparation < Phase::Disconnect);
    assert!(Phase::Disconnect < Phase::Reconnect);
    assert!(Phase::Reconnect < Phase::Verification);
    assert!(Phase::Verification < Phase::Cleanup);
}

#[test]
fn run_id_is_derived_from_start_time() {
    let start = chrono::Utc
        .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
        .single()
        .expect("valid timestamp");
    assert_eq!(generate_run_id(start), "mig-20260314-092653");

    let run = MigrationRun::new(
        start,
        RunConfig::new(),
        PathBuf::from("/tmp/b"),
        PathBuf::from("/tmp/l"),
    );
    assert_eq!(run.id, "mig-20260314-092653");
    assert_eq!(run.status, RunStatus::NotStarted);
    assert!(run.current_phase.is_none());
    assert!(!run.rolled_back);
}

#[test]
fn terminal_statuses() {
    assert!(!RunStatus::NotStarted.is_terminal());
    assert!(!RunStatus::Running.is_terminal());
    assert!(RunStatus::Completed.is_terminal());
    assert!(RunStatus::Failed.is_terminal());
    assert!(RunStatus::RolledBack.is_terminal());
}

#[test]
fn run_config_from_toml_stringifies_scalars() {
    let config = RunConfig::from_toml_str(
        "tenant_id = \"contoso\"\nretry_count = 3\nescrow_keys = true\n",
    )
    .expect("must parse");
    assert_eq!(config.len(), 3);
    assert_eq!(config.get("tenant_id"), Some("contoso"));
    assert_eq!(config.get("retry_count"), Some("3"));
    assert_eq!(config.get("escrow_keys"), Some("true"));
}

#[test]
fn run_config_from_json_skips_nulls_and_rejects_nesting() {
    let config = RunConfig::from_json_str(r#"{"TenantId":"contoso","Proxy":null,"Port":8443}"#)
        .expect("must parse");
    assert_eq!(config.get("TenantId"), Some("contoso"));
    assert_eq!(config.get("Port"), Some("8443"));
    assert!(config.get("Proxy").is_none());

    let err = RunConfig::from_json_str(r#"{"Groups":["a","b"]}"#)
        .expect_err("arrays are not scalar config values");
    assert!(err.to_string().contains("Groups"), "unexpected error: {err}");
}

#[test]
fn backup_source_classifies_registry_roots() {
    assert_eq!(
        BackupSource::parse(r"HKLM\SOFTWARE\Microsoft\Enrollments"),
        BackupSource::Registry(r"HKLM\SOFTWARE\Microsoft\Enrollments".to_string())
    );
    assert_eq!(
        BackupSource::parse(r"hkey_current_user\Software\Policies"),
        BackupSource::Registry(r"hkey_current_user\Software\Policies".to_string())
    );
    assert_eq!(
        BackupSource::parse("/var/lib/agent/state.json"),
        BackupSource::Path(PathBuf::from("/var/lib/agent/state.json"))
    );
    assert_eq!(
        BackupSource::parse(r"C:\ProgramData\Agent"),
        BackupSource::Path(PathBuf::from(r"C:\ProgramData\Agent"))
    );
}

#[test]
fn restore_filter_matches_item_kinds() {
    assert!(RestoreFilter::All.matches(BackupItemKind::Registry));
    assert!(RestoreFilter::All.matches(BackupItemKind::Directory));
    assert!(RestoreFilter::Registry.matches(BackupItemKind::Registry));
    assert!(!RestoreFilter::Registry.matches(BackupItemKind::File));
    assert!(RestoreFilter::Files.matches(BackupItemKind::File));
    assert!(RestoreFilter::Files.matches(BackupItemKind::Directory));
    assert!(!RestoreFilter::Files.matches(BackupItemKind::Registry));
    assert_eq!(BackupItemKind::Directory.to_string(), "directory");
}

#[test]
fn backup_manifest_round_trips_through_json() {
    let backup = Backup {
        component: "Enrollment".to_string(),
        migration_run_id: "mig-20260314-092653".to_string(),
        backup_path: PathBuf::from("/tmp/backups/mig/Enrollment/1"),
        creation_time: chrono::Utc::now(),
        size_bytes: 12,
        file_count: 1,
        status: BackupStatus::Created,
        items: vec![BackupItem {
            kind: BackupItemKind::File,
            source: "/etc/agent.conf".to_string(),
            stored: Some("files/0/agent.conf".to_string()),
            size_bytes: 12,
            file_count: 1,
            sha256: Some("abc".to_string()),
            modified: None,
            skipped_reason: None,
        }],
        data: Some(serde_json::json!({ "ticket": "CHG-1" })),
    };

    let raw = serde_json::to_string_pretty(&backup).expect("must serialize");
    assert!(raw.contains("\"status\": \"created\""));
    let parsed: Backup = serde_json::from_str(&raw).expect("must parse");
    assert_eq!(parsed, backup);
}

#[test]
fn layout_paths_are_scoped_by_run_and_component() {
    let layout = CutoverLayout::from_root("/srv/cutover");
    assert_eq!(layout.backup_location(), Path::new("/srv/cutover/backups"));
    assert_eq!(layout.log_path(), Path::new("/srv/cutover/logs"));
    assert_eq!(
        layout.component_dir("mig-1", "Enrollment"),
        PathBuf::from("/srv/cutover/backups/mig-1/Enrollment")
    );
    assert_eq!(
        layout.run_journal_path("mig-1"),
        PathBuf::from("/srv/cutover/logs/mig-1.journal")
    );
    assert_eq!(
        layout.run_metadata_path("mig-1"),
        PathBuf::from("/srv/cutover/logs/mig-1.json")
    );
}

#[test]
fn claimed_run_ids_never_collide() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let root = std::env::temp_dir().join(format!(
        "cutover-core-tests-{}-{}",
        std::process::id(),
        nanos
    ));
    let layout = CutoverLayout::from_root(&root);

    let first = layout
        .claim_run_id("mig-20260314-092653")
        .expect("must claim run id");
    let second = layout
        .claim_run_id("mig-20260314-092653")
        .expect("must claim run id");
    let third = layout
        .claim_run_id("mig-20260314-092653")
        .expect("must claim run id");

    assert_eq!(first, "mig-20260314-092653");
    assert_eq!(second, "mig-20260314-092653-1");
    assert_eq!(third, "mig-20260314-092653-2");
    assert!(layout.run_journal_path(&second).is_file());

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn cutover_error_messages_name_the_failing_item() {
    let err = CutoverError::StepExecution {
        step: "RemoveEnrollment".to_string(),
        detail: "access denied".to_string(),
    };
    assert_eq!(err.to_string(), "step 'RemoveEnrollment' failed: access denied");
}

#[test]
fn powershell_quotes_are_doubled() {
    assert_eq!(escape_ps_single_quote("Before 'cutover'"), "Before ''cutover''");
}

#[cfg(unix)]
#[test]
fn run_command_reports_exit_status_and_output() {
    let mut ok = std::process::Command::new("sh");
    ok.args(["-c", "exit 0"]);
    run_command(&mut ok, "sample command").expect("zero exit must succeed");

    let mut failing = std::process::Command::new("sh");
    failing.args(["-c", "echo nope >&2; exit 3"]);
    let err = run_command(&mut failing, "sample command").expect_err("non-zero exit must fail");
    let message = err.to_string();
    assert!(message.starts_with("sample command: status="), "unexpected error: {message}");
    assert!(message.contains("stderr='nope'"), "unexpected error: {message}");
}
