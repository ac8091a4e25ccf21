use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};

use super::*;
use crate::fs::{FileSystem, MemoryFs};

const COMMIT: &str = "0123456789abcdef0123456789abcdef01234567";
const LEDGER: &str = "/p/ccmd.lock";

/// An installer which records every call and keeps its "disk" in memory.
#[derive(Default)]
struct RecordingInstaller {
    installed: Mutex<BTreeMap<String, LockEntry>>,
    calls: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl RecordingInstaller {
    fn with(entries: &[LockEntry]) -> Self {
        RecordingInstaller {
            installed: Mutex::new(entries.iter().map(|e| (e.name.clone(), e.clone())).collect()),
            ..Default::default()
        }
    }

    fn failing_on(mut self, name: &str) -> Self {
        self.failing.push(name.to_owned());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) -> Result<(), BoxError> {
        self.calls.lock().map_err(|e| e.to_string())?.push(call);
        Ok(())
    }
}

impl Installer for RecordingInstaller {
    fn install(&self, repo: &Repo, spec: &str, name: &str) -> Result<LockEntry, BoxError> {
        self.record(format!("install {name}"))?;
        if self.failing.iter().any(|f| f == name) {
            return Err(format!("clone of {repo} failed").into());
        }
        let entry = installed(&repo.to_string(), spec);
        self.installed
            .lock()
            .map_err(|e| e.to_string())?
            .insert(name.to_owned(), entry.clone());
        Ok(entry)
    }

    fn remove(&self, name: &str) -> Result<(), BoxError> {
        self.record(format!("remove {name}"))?;
        if self.failing.iter().any(|f| f == name) {
            return Err("permission denied".into());
        }
        self.installed.lock().map_err(|e| e.to_string())?.remove(name);
        Ok(())
    }

    fn list_installed(&self) -> Result<Vec<LockEntry>, BoxError> {
        Ok(self
            .installed
            .lock()
            .map_err(|e| e.to_string())?
            .values()
            .cloned()
            .collect())
    }
}

fn installed(repo: &str, version: &str) -> LockEntry {
    let at = Utc
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default();
    let repo: Repo = repo.parse().unwrap();
    LockEntry::new(&repo, version, COMMIT, at)
}

fn ledger(fs: &Arc<MemoryFs>, entries: &[LockEntry]) -> anyhow::Result<LockStore> {
    let lock = LockStore::open(LEDGER, fs.clone())?;
    lock.replace(entries.iter().cloned())?;
    lock.save()?;
    Ok(lock)
}

fn names(lock: &LockStore) -> Vec<String> {
    lock.list_commands().into_iter().map(|e| e.name).collect()
}

fn scenario() -> anyhow::Result<(Config, Vec<LockEntry>)> {
    let config: Config =
        r#"commands = ["owner/tool1@v1.0.0", "owner/tool3@v3.0.0"]"#.parse()?;
    let recorded = vec![
        installed("owner/tool1", "v1.0.0"),
        installed("owner/tool2", "v2.0.0"),
    ];
    Ok((config, recorded))
}

fn never(_: &SyncPlan) -> Result<bool, BoxError> {
    Err("confirmation should not have been requested".into())
}

#[test]
fn plan_diffs_names() -> anyhow::Result<()> {
    let (config, recorded) = scenario()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &recorded)?;
    let installer = RecordingInstaller::with(&recorded);

    let plan = Reconciler::new(&config, &lock, &installer).plan()?;
    assert_eq!(plan.len(), 2);
    insta::assert_snapshot!(plan.to_string(), @r"
    + tool3 (owner/tool3@v3.0.0)
    - tool2
    ");
    assert!(installer.calls().is_empty());
    Ok(())
}

#[test]
fn plan_ignores_changed_specifiers() -> anyhow::Result<()> {
    let config: Config = r#"commands = ["owner/tool1@^2"]"#.parse()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &[installed("owner/tool1", "v1.0.0")])?;
    let installer = RecordingInstaller::default();

    let plan = Reconciler::new(&config, &lock, &installer).plan()?;
    assert!(plan.is_empty());
    insta::assert_snapshot!(plan.to_string(), @"everything is up to date");
    Ok(())
}

#[test]
fn plan_rejects_conflicting_names() -> anyhow::Result<()> {
    let config: Config = r#"commands = ["a/tool", "a/tool@v1.0.0", "b/tool"]"#.parse()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = LockStore::open(LEDGER, fs)?;
    let installer = RecordingInstaller::default();

    let err = Reconciler::new(&config, &lock, &installer).plan().unwrap_err();
    assert!(matches!(err, SyncError::NameConflict { ref name, .. } if name == "tool"));
    Ok(())
}

#[test]
fn forced_run_converges() -> anyhow::Result<()> {
    let (config, recorded) = scenario()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &recorded)?;
    let installer = RecordingInstaller::with(&recorded);
    let reconciler = Reconciler::new(&config, &lock, &installer);

    let options = SyncOptions {
        force: true,
        ..Default::default()
    };
    let report = reconciler.run(options, never)?;

    assert_eq!(report.status, SyncStatus::Completed);
    assert!(report.is_success());
    assert_eq!(installer.calls(), ["install tool3", "remove tool2"]);
    assert_eq!(names(&lock), ["tool1", "tool3"]);

    let reopened = LockStore::open(LEDGER, fs.clone())?;
    assert_eq!(names(&reopened), ["tool1", "tool3"]);

    // a second run has nothing left to do
    assert!(reconciler.plan()?.is_empty());
    let again = reconciler.run(options, never)?;
    assert!(again.outcomes.is_empty());
    assert_eq!(installer.calls().len(), 2);
    Ok(())
}

#[test]
fn dry_run_has_no_side_effects() -> anyhow::Result<()> {
    let (config, recorded) = scenario()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &recorded)?;
    let before = fs.read(Path::new(LEDGER))?;
    let installer = RecordingInstaller::with(&recorded);

    let options = SyncOptions {
        dry_run: true,
        force: true,
    };
    let report = Reconciler::new(&config, &lock, &installer).run(options, never)?;

    assert_eq!(report.status, SyncStatus::DryRun);
    assert_eq!(report.plan.to_remove, ["tool2"]);
    assert!(installer.calls().is_empty());
    assert_eq!(fs.read(Path::new(LEDGER))?, before);
    assert_eq!(fs.files(), vec![Path::new(LEDGER).to_path_buf()]);
    Ok(())
}

#[test]
fn declined_removal_cancels() -> anyhow::Result<()> {
    let (config, recorded) = scenario()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &recorded)?;
    let before = fs.read(Path::new(LEDGER))?;
    let installer = RecordingInstaller::with(&recorded);

    let mut asked = None;
    let report = Reconciler::new(&config, &lock, &installer).run(SyncOptions::default(), |plan| {
        asked = Some(plan.to_remove.clone());
        Ok(false)
    })?;

    assert_eq!(report.status, SyncStatus::Cancelled);
    assert!(report.is_success());
    assert_eq!(asked, Some(vec!["tool2".to_owned()]));
    assert!(installer.calls().is_empty());
    assert_eq!(fs.read(Path::new(LEDGER))?, before);
    Ok(())
}

#[test]
fn installs_alone_need_no_confirmation() -> anyhow::Result<()> {
    let config: Config = r#"commands = ["owner/tool1"]"#.parse()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = LockStore::open(LEDGER, fs.clone())?;
    let installer = RecordingInstaller::default();

    let report = Reconciler::new(&config, &lock, &installer).run(SyncOptions::default(), never)?;
    assert_eq!(report.status, SyncStatus::Completed);
    assert_eq!(
        lock.get_command("tool1").map(|e| e.version),
        Some("latest".to_owned())
    );
    Ok(())
}

#[test]
fn failures_are_collected() -> anyhow::Result<()> {
    let config: Config = r#"commands = ["acme/one", "acme/two", "acme/three"]"#.parse()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = LockStore::open(LEDGER, fs.clone())?;
    let installer = RecordingInstaller::default().failing_on("two");

    let report = Reconciler::new(&config, &lock, &installer).run(SyncOptions::default(), never)?;

    assert_eq!(report.status, SyncStatus::Completed);
    assert!(!report.is_success());
    assert_eq!(installer.calls(), ["install one", "install two", "install three"]);

    let summary: Vec<_> = report
        .outcomes
        .iter()
        .map(|o| (o.operation, o.name.as_str(), o.error.is_some()))
        .collect();
    assert_eq!(
        summary,
        [
            (Operation::Install, "one", false),
            (Operation::Install, "two", true),
            (Operation::Install, "three", false),
        ]
    );

    let failed: Vec<_> = report.failures().map(|o| o.name.as_str()).collect();
    assert_eq!(failed, ["two"]);
    assert_eq!(names(&lock), ["one", "three"]);
    assert_eq!(names(&LockStore::open(LEDGER, fs)?), ["one", "three"]);
    Ok(())
}

#[test]
fn failed_removal_stays_recorded() -> anyhow::Result<()> {
    let (config, recorded) = scenario()?;
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &recorded)?;
    let installer = RecordingInstaller::with(&recorded).failing_on("tool2");

    let options = SyncOptions {
        force: true,
        ..Default::default()
    };
    let report = Reconciler::new(&config, &lock, &installer).run(options, never)?;

    assert!(!report.is_success());
    assert_eq!(names(&lock), ["tool1", "tool2", "tool3"]);
    Ok(())
}

#[test]
fn empty_plan_leaves_ledger_alone() -> anyhow::Result<()> {
    let config: Config = r#"commands = ["owner/tool1@v1.0.0"]"#.parse()?;
    let recorded = [installed("owner/tool1", "v1.0.0")];
    let fs = Arc::new(MemoryFs::new());
    let lock = ledger(&fs, &recorded)?;
    let before = fs.read(Path::new(LEDGER))?;
    // the installer no longer reports tool1, as if its directory was deleted by hand
    let installer = RecordingInstaller::default();

    let report = Reconciler::new(&config, &lock, &installer).run(SyncOptions::default(), never)?;

    assert_eq!(report.status, SyncStatus::Completed);
    assert!(report.outcomes.is_empty());
    assert!(installer.calls().is_empty());
    assert_eq!(names(&lock), ["tool1"]);
    assert_eq!(fs.read(Path::new(LEDGER))?, before);
    Ok(())
}
