use super::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use cutover_core::{BackupItemKind, BackupSource, BackupStatus, CutoverError, CutoverLayout, RestoreFilter};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Default)]
struct FakeRegistry {
    keys: Mutex<BTreeMap<String, String>>,
    imported: Mutex<Vec<PathBuf>>,
    fail_imports: bool,
}

impl FakeRegistry {
    fn with_key(key: &str, value: &str) -> Self {
        let registry = Self::default();
        registry
            .keys
            .lock()
            .expect("registry lock")
            .insert(key.to_string(), value.to_string());
        registry
    }

    fn failing_imports() -> Self {
        Self {
            fail_imports: true,
            ..Self::default()
        }
    }

    fn remove_key(&self, key: &str) {
        self.keys.lock().expect("registry lock").remove(key);
    }
}

impl RegistryTool for FakeRegistry {
    fn export_key(&self, key: &str, dest: &Path) -> Result<()> {
        let keys = self.keys.lock().expect("registry lock");
        let value = keys
            .get(key)
            .ok_or_else(|| anyhow!("ERROR: The system was unable to find the specified registry key"))?;
        let body = format!(
            "Windows Registry Editor Version 5.00\r\n\r\n[{key}]\r\n\"Value\"=\"{value}\"\r\n"
        );
        fs::write(dest, body)?;
        Ok(())
    }

    fn import_file(&self, path: &Path) -> Result<()> {
        if self.fail_imports {
            return Err(anyhow!("reg import failed: status=exit status: 1"));
        }
        let raw = fs::read_to_string(path)?;
        let key = raw
            .lines()
            .find_map(|line| line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')))
            .ok_or_else(|| anyhow!("export has no key header"))?
            .to_string();
        self.keys
            .lock()
            .expect("registry lock")
            .insert(key, "restored".to_string());
        self.imported
            .lock()
            .expect("registry lock")
            .push(path.to_path_buf());
        Ok(())
    }

    fn key_exists(&self, key: &str) -> Result<bool> {
        Ok(self.keys.lock().expect("registry lock").contains_key(key))
    }
}

fn build_test_root(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "cutover-backup-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    build_test_root(nanos)
}

fn test_store(root: &Path) -> BackupStore {
    let layout = CutoverLayout::from_root(root.join("state"));
    layout.ensure_base_dirs().expect("must create dirs");
    BackupStore::new(layout, "mig-20260314-092653")
}

fn long_value() -> String {
    "x".repeat(120)
}

#[test]
fn backup_without_sources_fails_integrity() {
    let root = test_root();
    let store = test_store(&root);

    let mut backup = store.create_backup("X", &[]).expect("must create backup");
    assert_eq!(backup.size_bytes, 0);
    assert_eq!(backup.status, BackupStatus::Created);
    assert!(backup.manifest_path().is_file());

    assert!(!store.validate_integrity(&mut backup));
    assert_eq!(backup.status, BackupStatus::Invalid);

    let reloaded = load_backup(&backup.backup_path).expect("must reload");
    assert_eq!(reloaded.status, BackupStatus::Invalid);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_with_real_file_passes_integrity() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("live").join("agent.conf");
    fs::create_dir_all(source.parent().expect("parent")).expect("must create source dir");
    fs::write(&source, "EnrollmentId=1234\nServer=mdm.example.test\n").expect("must write");

    let mut backup = store
        .create_backup("AgentConfig", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    assert_eq!(backup.file_count, 1);
    assert!(backup.size_bytes > 0);
    assert!(backup
        .backup_path
        .starts_with(store.layout().component_dir("mig-20260314-092653", "AgentConfig")));

    assert!(store.validate_integrity(&mut backup));
    assert_eq!(backup.status, BackupStatus::Validated);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn integrity_fails_when_stored_copy_changes_size() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("live.txt");
    fs::write(&source, "original payload").expect("must write");

    let mut backup = store
        .create_backup("Live", &[BackupSource::Path(source)])
        .expect("must create backup");
    let stored = backup
        .backup_path
        .join(backup.items[0].stored.as_deref().expect("stored"));
    fs::write(&stored, "x").expect("must truncate stored copy");

    let check = store.check_integrity(&backup);
    assert!(!check.valid);
    assert!(
        check.problems.iter().any(|problem| problem.contains("does not match")),
        "unexpected problems: {:?}",
        check.problems
    );
    assert!(!store.validate_integrity(&mut backup));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn integrity_fails_when_stored_tree_gains_or_loses_files() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("Certificates");
    fs::create_dir_all(&source).expect("must create source dir");
    fs::write(source.join("device.pem"), "-----BEGIN CERTIFICATE-----").expect("must write");
    fs::write(source.join("empty.marker"), "").expect("must write");

    let backup = store
        .create_backup("Certificates", &[BackupSource::Path(source)])
        .expect("must create backup");
    assert_eq!(backup.file_count, 2);
    assert!(store.check_integrity(&backup).valid);

    let stored = backup
        .backup_path
        .join(backup.items[0].stored.as_deref().expect("stored"));
    fs::write(stored.join("extra.txt"), "").expect("must add empty file");
    let check = store.check_integrity(&backup);
    assert!(!check.valid);
    assert!(
        check.problems.iter().any(|problem| problem.contains("file count 3")),
        "unexpected problems: {:?}",
        check.problems
    );

    fs::remove_file(stored.join("extra.txt")).expect("must remove extra file");
    fs::remove_file(stored.join("empty.marker")).expect("must remove empty file");
    let check = store.check_integrity(&backup);
    assert!(!check.valid);
    assert!(
        check.problems.iter().any(|problem| problem.contains("file count 1")),
        "unexpected problems: {:?}",
        check.problems
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn integrity_fails_when_stored_content_changes_in_place() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("tenant.conf");
    fs::write(&source, "tenant=contoso").expect("must write");

    let mut backup = store
        .create_backup("Tenant", &[BackupSource::Path(source)])
        .expect("must create backup");
    let stored = backup
        .backup_path
        .join(backup.items[0].stored.as_deref().expect("stored"));
    fs::write(&stored, "tenant=CONTOSO").expect("must rewrite stored copy");

    let check = store.check_integrity(&backup);
    assert!(
        check
            .problems
            .iter()
            .any(|problem| problem.contains("content hash does not match")),
        "unexpected problems: {:?}",
        check.problems
    );
    assert!(!store.validate_integrity(&mut backup));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_sources_are_recorded_as_skipped() {
    let root = test_root();
    let store = test_store(&root);

    let backup = store
        .create_backup(
            "Browser",
            &[BackupSource::Path(root.join("does-not-exist"))],
        )
        .expect("must create backup");
    assert_eq!(backup.items.len(), 1);
    assert!(backup.items[0].stored.is_none());
    assert_eq!(
        backup.items[0].skipped_reason.as_deref(),
        Some("source not found")
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn repeated_backups_get_fresh_directories() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("a.txt");
    fs::write(&source, "payload").expect("must write");

    let first = store
        .create_backup("Same", &[BackupSource::Path(source.clone())])
        .expect("must create first");
    let second = store
        .create_backup("Same", &[BackupSource::Path(source)])
        .expect("must create second");
    assert_ne!(first.backup_path, second.backup_path);
    assert!(first.manifest_path().is_file());
    assert!(second.manifest_path().is_file());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn component_names_must_not_escape_run_directory() {
    let root = test_root();
    let store = test_store(&root);

    for name in ["", "..", "a/b", r"a\b"] {
        assert!(
            store.create_backup(name, &[]).is_err(),
            "component '{name}' should be rejected"
        );
    }

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn restore_requires_validated_backup() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("a.txt");
    fs::write(&source, "payload").expect("must write");

    let mut backup = store
        .create_backup("Unchecked", &[BackupSource::Path(source)])
        .expect("must create backup");
    let err = store
        .restore(&mut backup, RestoreFilter::All, false)
        .expect_err("unvalidated backup must not restore");
    assert!(matches!(err, CutoverError::BackupIntegrity { .. }));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn restore_without_force_leaves_existing_destination() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("profile.ini");
    fs::write(&source, "backed-up").expect("must write");

    let mut backup = store
        .create_backup("Profile", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    assert!(store.validate_integrity(&mut backup));

    fs::write(&source, "changed after backup").expect("must overwrite live file");
    let report = store
        .restore(&mut backup, RestoreFilter::All, false)
        .expect("restore must run");
    assert_eq!(report.restored_count, 0);
    assert_eq!(report.failed_count, 1);
    assert_eq!(
        fs::read_to_string(&source).expect("must read"),
        "changed after backup"
    );
    assert_eq!(backup.status, BackupStatus::Validated);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn forced_restore_preserves_existing_destination() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("profile.ini");
    fs::write(&source, "backed-up").expect("must write");

    let mut backup = store
        .create_backup("Profile", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    assert!(store.validate_integrity(&mut backup));

    fs::write(&source, "changed after backup").expect("must overwrite live file");
    let report = store
        .restore(&mut backup, RestoreFilter::Files, true)
        .expect("restore must run");
    assert_eq!(report.restored_count, 1);
    assert_eq!(report.failed_count, 0);
    assert_eq!(fs::read_to_string(&source).expect("must read"), "backed-up");

    let preserved = report.items[0]
        .pre_restore_path
        .clone()
        .expect("existing file must be preserved");
    assert!(preserved
        .file_name()
        .and_then(|name| name.to_str())
        .expect("utf-8 name")
        .ends_with(".pre_restore"));
    assert_eq!(preserved.parent(), source.parent());
    assert_eq!(
        fs::read_to_string(&preserved).expect("must read preserved"),
        "changed after backup"
    );
    assert_eq!(backup.status, BackupStatus::Restored);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_forced_restore_puts_original_back() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("profile.ini");
    fs::write(&source, "backed-up").expect("must write");

    let mut backup = store
        .create_backup("Profile", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    assert!(store.validate_integrity(&mut backup));

    fs::write(&source, "changed after backup").expect("must overwrite live file");
    let stored = backup
        .backup_path
        .join(backup.items[0].stored.as_deref().expect("stored"));
    fs::remove_file(&stored).expect("must remove stored copy");

    let report = store
        .restore(&mut backup, RestoreFilter::Files, true)
        .expect("restore must run");
    assert_eq!(report.failed_count, 1);
    assert!(report.items[0].pre_restore_path.is_none());
    assert!(report.items[0].detail.is_some());
    assert_eq!(
        fs::read_to_string(&source).expect("original must survive"),
        "changed after backup"
    );
    let leftovers = fs::read_dir(&root)
        .expect("must list root")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".pre_restore"))
        .count();
    assert_eq!(leftovers, 0);
    assert_eq!(backup.status, BackupStatus::Validated);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn directories_restore_as_trees() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("Outlook");
    fs::create_dir_all(source.join("Signatures")).expect("must create dirs");
    fs::write(source.join("Signatures").join("work.htm"), "<p>regards</p>").expect("must write");
    fs::write(source.join("profile.xml"), "<profile/>").expect("must write");

    let mut backup = store
        .create_backup("OutlookData", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    assert_eq!(backup.items[0].kind, BackupItemKind::Directory);
    assert_eq!(backup.file_count, 2);
    assert!(store.validate_integrity(&mut backup));

    fs::remove_dir_all(&source).expect("must remove live dir");
    let report = store
        .restore(&mut backup, RestoreFilter::All, false)
        .expect("restore must run");
    assert_eq!(report.restored_count, 1);
    assert_eq!(
        fs::read_to_string(source.join("Signatures").join("work.htm")).expect("must read"),
        "<p>regards</p>"
    );

    let validation = store.test_restoration_validity(&backup);
    assert_eq!(validation.valid_items, 1);
    assert!(validation.is_valid());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn registry_items_round_trip_through_tool() {
    let root = test_root();
    let key = r"HKLM\SOFTWARE\Microsoft\Enrollments\ABC";
    let registry = Arc::new(FakeRegistry::with_key(key, &long_value()));
    let store = test_store(&root).with_registry_tool(registry.clone());

    let mut backup = store
        .create_backup("Enrollments", &[BackupSource::Registry(key.to_string())])
        .expect("must create backup");
    assert_eq!(backup.items[0].kind, BackupItemKind::Registry);
    assert_eq!(backup.items[0].stored.as_deref(), Some("registry/0.reg"));
    assert!(store.validate_integrity(&mut backup));

    registry.remove_key(key);
    let before = store.test_restoration_validity(&backup);
    assert_eq!(before.invalid_items, 1);
    assert_eq!(before.details[0].detail, "registry key not present");
    assert!(before.as_error().is_some());

    let report = store
        .restore(&mut backup, RestoreFilter::Registry, false)
        .expect("restore must run");
    assert_eq!(report.restored_count, 1);
    assert_eq!(registry.imported.lock().expect("registry lock").len(), 1);

    let after = store.test_restoration_validity(&backup);
    assert!(after.is_valid());
    assert!(after.as_error().is_none());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn short_registry_export_is_implausible() {
    let root = test_root();
    let key = r"HKCU\Software\A";
    let registry = Arc::new(FakeRegistry::with_key(key, ""));
    let store = test_store(&root).with_registry_tool(registry);

    let mut backup = store
        .create_backup("Tiny", &[BackupSource::Registry(key.to_string())])
        .expect("must create backup");
    assert!(backup.size_bytes > 0);
    assert!(backup.size_bytes < MIN_REGISTRY_EXPORT_BYTES);
    assert!(!store.validate_integrity(&mut backup));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_registry_export_is_skipped() {
    let root = test_root();
    let store = test_store(&root).with_registry_tool(Arc::new(FakeRegistry::default()));

    let backup = store
        .create_backup(
            "MissingKey",
            &[BackupSource::Registry(r"HKLM\SOFTWARE\Nope".to_string())],
        )
        .expect("must create backup");
    assert!(backup.items[0].stored.is_none());
    assert!(backup.items[0]
        .skipped_reason
        .as_deref()
        .expect("reason")
        .contains("unable to find"));
    assert!(!backup.backup_path.join("registry/0.reg").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_registry_import_counts_item_and_continues() {
    let root = test_root();
    let key = r"HKLM\SOFTWARE\Policies\Agent";
    let exporter = Arc::new(FakeRegistry::with_key(key, &long_value()));
    let store = test_store(&root).with_registry_tool(exporter);
    let file_source = root.join("policy.json");
    fs::write(&file_source, "{\"mdm\":true}").expect("must write");

    let mut backup = store
        .create_backup(
            "Policies",
            &[
                BackupSource::Registry(key.to_string()),
                BackupSource::Path(file_source.clone()),
            ],
        )
        .expect("must create backup");
    assert!(store.validate_integrity(&mut backup));
    fs::remove_file(&file_source).expect("must remove live file");

    let failing = store
        .clone()
        .with_registry_tool(Arc::new(FakeRegistry::failing_imports()));
    let report = failing
        .restore(&mut backup, RestoreFilter::All, false)
        .expect("restore must run");
    assert_eq!(report.restored_count, 1);
    assert_eq!(report.failed_count, 1);
    assert!(file_source.is_file());
    assert_ne!(backup.status, BackupStatus::Restored);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn restoration_validity_reports_content_mismatch() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("state.json");
    fs::write(&source, "{\"joined\":true}").expect("must write");

    let backup = store
        .create_backup("State", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    fs::write(&source, "{\"joined\":false}").expect("must change live file");

    let report = store.test_restoration_validity(&backup);
    assert_eq!(report.invalid_items, 1);
    assert_eq!(report.details[0].detail, "content hash mismatch");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn list_and_cleanup_backups_by_age() {
    let root = test_root();
    let store = test_store(&root);
    let source = root.join("a.txt");
    fs::write(&source, "payload").expect("must write");

    let mut old = store
        .create_backup("Old", &[BackupSource::Path(source.clone())])
        .expect("must create backup");
    old.creation_time = Utc::now() - Duration::days(45);
    write_manifest(&old).expect("must rewrite manifest");
    let fresh = store
        .create_backup("Fresh", &[BackupSource::Path(source)])
        .expect("must create backup");

    let location = store.layout().backup_location().to_path_buf();
    let listed = list_backups(&location, None).expect("must list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].component, "Old");
    assert_eq!(
        list_backups(&location, Some("mig-other"))
            .expect("must list")
            .len(),
        0
    );

    let report = cleanup_backups(&location, Duration::days(30), Utc::now()).expect("must clean");
    assert_eq!(report.removed, vec![old.backup_path.clone()]);
    assert_eq!(report.kept, 1);
    assert!(!old.backup_path.exists());
    assert!(!store
        .layout()
        .component_dir("mig-20260314-092653", "Old")
        .exists());
    assert!(fresh.backup_path.exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn test_root_disambiguates_same_timestamp_calls() {
    assert_ne!(build_test_root(42), build_test_root(42));
}
