//! # Reconciliation
//!
//! The [`Reconciler`] converges what is installed towards what the manifest declares. It
//! compares declared command names against the names recorded in the ledger and never against
//! what is on disk, so the ledger stays the single source of truth for installed state.
//!
//! ## Run Lifecycle
//!
//! 1. **Plan**: compute `to_install` (declared, not recorded) and `to_remove` (recorded, no
//!    longer declared). Commands present in both are left alone, even if their declared
//!    specifier changed; re-pinning is the job of `update`.
//! 2. **Gate**: a dry run stops here. A run which would remove commands asks for confirmation
//!    unless forced, and a refusal cancels the run without touching anything.
//! 3. **Apply**: installs run in manifest order, then removals in name order. A failed item is
//!    recorded in the [`SyncReport`] and the run carries on with the next one.
//! 4. **Rebuild**: the ledger is replaced with what the [`Installer`] reports as installed, then
//!    persisted.
//!
//! A run with an empty plan completes without asking the installer anything and without
//! writing the ledger. A command directory removed by hand therefore stays recorded until it
//! is reinstalled with `update` or undeclared and synced away.

#[cfg(test)]
mod test;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::BoxError;
use crate::lock::{LockEntry, LockError, LockStore};
use crate::manifest::Config;
use crate::repo::Repo;

//================================================================================================
// Types
//================================================================================================

/// An error which aborts a sync run as a whole. Failures of individual items are reported in
/// the [`SyncReport`] instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Two declared repositories map to the same command name.
    #[error("'{first}' and '{second}' would both be installed as '{name}'")]
    NameConflict {
        /// The contested command name.
        name: String,
        /// The repository declared first.
        first: Repo,
        /// The repository declared second.
        second: Repo,
    },
    /// The confirmation prompt failed.
    #[error("failed to confirm removals")]
    Confirm(#[source] BoxError),
    /// The installer could not report what it has installed.
    #[error("failed to list installed commands")]
    Installed(#[source] BoxError),
    /// The rebuilt ledger could not be stored.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// A command to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInstall {
    /// The declared repository.
    pub repo: Repo,
    /// The declared version specifier.
    pub spec: String,
    /// The command name.
    pub name: String,
}

/// The difference between the manifest and the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Commands declared but not recorded, in manifest order.
    pub to_install: Vec<PlannedInstall>,
    /// Commands recorded but no longer declared, in name order.
    pub to_remove: Vec<String>,
}

/// Switches for a sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compute and report the plan without applying it.
    pub dry_run: bool,
    /// Apply removals without asking for confirmation.
    pub force: bool,
}

/// The kind of work done for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// The command was installed.
    Install,
    /// The command was removed.
    Remove,
}

/// The result of one planned item.
#[derive(Debug)]
pub struct Outcome {
    /// What was attempted.
    pub operation: Operation,
    /// The command it was attempted on.
    pub name: String,
    /// Why it failed, if it did.
    pub error: Option<BoxError>,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Only the plan was computed.
    DryRun,
    /// Removals were declined, nothing was changed.
    Cancelled,
    /// The plan was applied and the ledger rebuilt.
    Completed,
}

/// Everything a run planned and did.
#[derive(Debug)]
pub struct SyncReport {
    /// The computed difference.
    pub plan: SyncPlan,
    /// How the run ended.
    pub status: SyncStatus,
    /// One entry per attempted item, in processing order.
    pub outcomes: Vec<Outcome>,
}

/// Drives a sync run over a manifest, a ledger and an installer.
pub struct Reconciler<'a, I: Installer + ?Sized> {
    config: &'a Config,
    lock: &'a LockStore,
    installer: &'a I,
}

//================================================================================================
// Traits
//================================================================================================

/// Materializes and removes commands.
pub trait Installer {
    /// Install `repo` at `spec` under the command `name`, returning its ledger record.
    fn install(&self, repo: &Repo, spec: &str, name: &str) -> Result<LockEntry, BoxError>;

    /// Remove the installed command `name`.
    fn remove(&self, name: &str) -> Result<(), BoxError>;

    /// Every command currently installed.
    fn list_installed(&self) -> Result<Vec<LockEntry>, BoxError>;
}

//================================================================================================
// Impls
//================================================================================================

impl SyncPlan {
    /// Whether there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }

    /// The number of items to process.
    pub fn len(&self) -> usize {
        self.to_install.len() + self.to_remove.len()
    }
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "everything is up to date");
        }
        for item in &self.to_install {
            writeln!(f, "+ {} ({}@{})", item.name, item.repo, item.spec)?;
        }
        for name in &self.to_remove {
            writeln!(f, "- {}", name)?;
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install => f.write_str("install"),
            Operation::Remove => f.write_str("remove"),
        }
    }
}

impl SyncReport {
    /// The items which failed.
    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    /// Whether every attempted item succeeded.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl<'a, I: Installer + ?Sized> Reconciler<'a, I> {
    /// A reconciler for the given manifest, ledger and installer.
    pub fn new(config: &'a Config, lock: &'a LockStore, installer: &'a I) -> Self {
        Reconciler {
            config,
            lock,
            installer,
        }
    }

    /// Compute the difference between the manifest and the ledger.
    pub fn plan(&self) -> Result<SyncPlan, SyncError> {
        let mut declared: BTreeMap<&str, &Repo> = BTreeMap::new();
        let mut to_install = Vec::new();
        let recorded: BTreeSet<String> =
            self.lock.list_commands().into_iter().map(|e| e.name).collect();

        for command in self.config.commands() {
            let name = command.name();
            match declared.get(name) {
                Some(&first) if first == command.repo() => continue,
                Some(&first) => {
                    return Err(SyncError::NameConflict {
                        name: name.to_owned(),
                        first: first.to_owned(),
                        second: command.repo().to_owned(),
                    });
                },
                None => {
                    declared.insert(name, command.repo());
                },
            }
            if !recorded.contains(name) {
                to_install.push(PlannedInstall {
                    repo: command.repo().to_owned(),
                    spec: command.version_spec().to_owned(),
                    name: name.to_owned(),
                });
            }
        }

        let to_remove = recorded
            .into_iter()
            .filter(|name| !declared.contains_key(name.as_str()))
            .collect();

        Ok(SyncPlan {
            to_install,
            to_remove,
        })
    }

    /// Plan, then apply the plan subject to `options`.
    ///
    /// `confirm` is only consulted for a real, unforced run that would remove commands.
    pub fn run<F>(&self, options: SyncOptions, confirm: F) -> Result<SyncReport, SyncError>
    where
        F: FnOnce(&SyncPlan) -> Result<bool, BoxError>,
    {
        let plan = self.plan()?;
        tracing::info!(
            install = plan.to_install.len(),
            remove = plan.to_remove.len(),
            dry_run = options.dry_run,
            "computed sync plan"
        );

        let report = |status, outcomes| SyncReport {
            plan: plan.clone(),
            status,
            outcomes,
        };

        if options.dry_run {
            return Ok(report(SyncStatus::DryRun, Vec::new()));
        }
        if plan.is_empty() {
            return Ok(report(SyncStatus::Completed, Vec::new()));
        }
        if !plan.to_remove.is_empty()
            && !options.force
            && !confirm(&plan).map_err(SyncError::Confirm)?
        {
            tracing::warn!("sync cancelled, nothing was changed");
            return Ok(report(SyncStatus::Cancelled, Vec::new()));
        }

        let outcomes = self.apply(&plan);
        self.rebuild()?;
        Ok(report(SyncStatus::Completed, outcomes))
    }

    fn apply(&self, plan: &SyncPlan) -> Vec<Outcome> {
        let bar = tracing::info_span!("sync");
        crate::log::set_bar(&bar, "syncing commands", plan.len() as u64);
        let _bar = bar.enter();

        let mut outcomes = Vec::with_capacity(plan.len());
        for item in &plan.to_install {
            let span = tracing::info_span!("install", command.name = %item.name, repo = %item.repo);
            crate::log::set_sub_task(&span, &format!("installing {}@{}", item.repo, item.spec));
            let _enter = span.enter();

            let error = self
                .installer
                .install(&item.repo, &item.spec, &item.name)
                .map(|entry| {
                    tracing::info!(version = %entry.version, "installed");
                })
                .err();
            outcomes.push(self.outcome(Operation::Install, &item.name, error));
            crate::log::step(&bar);
        }

        for name in &plan.to_remove {
            let span = tracing::info_span!("remove", command.name = %name);
            crate::log::set_sub_task(&span, &format!("removing {}", name));
            let _enter = span.enter();

            let error = self.installer.remove(name).err();
            outcomes.push(self.outcome(Operation::Remove, name, error));
            crate::log::step(&bar);
        }
        outcomes
    }

    fn outcome(&self, operation: Operation, name: &str, error: Option<BoxError>) -> Outcome {
        if let Some(e) = &error {
            tracing::warn!(command.name = %name, %operation, error = %e, "operation failed");
        }
        Outcome {
            operation,
            name: name.to_owned(),
            error,
        }
    }

    fn rebuild(&self) -> Result<(), SyncError> {
        let installed = self.installer.list_installed().map_err(SyncError::Installed)?;
        tracing::debug!(installed = installed.len(), "rebuilding ledger");
        self.lock.replace(installed)?;
        self.lock.save()?;
        Ok(())
    }
}
