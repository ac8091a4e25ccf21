//! # Installer
//!
//! [`GitInstaller`] materializes a command by cloning its repository into a staging area,
//! resolving the requested version against the clone's tags, checking it out and copying the
//! tree (without `.git`) to `<commands_dir>/<name>`. Next to the files it writes an install
//! record, a [`LockEntry`] in TOML, which is what [`Installer::list_installed`] reports back to
//! the reconciler.
//!
//! ## Compensation
//!
//! Each completed step of an install registers the action that undoes it. If a later step
//! fails, the registered actions run in reverse: partial output is deleted and a previous
//! install, which was moved aside before copying, is put back. A failed install therefore
//! leaves the commands directory as it found it.


use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::fs::FileSystem;
use crate::git::{self, GitClient};
use crate::lock::{LockEntry, LockError};
use crate::repo::{self, Repo};
use crate::sync::Installer;
use crate::version::{self, ResolveError};
use crate::{BoxError, INSTALL_RECORD_NAME};

//================================================================================================
// Types
//================================================================================================

/// An error that can occur while installing or removing a command.
#[derive(Error, Debug)]
pub enum InstallError {
    /// The command name cannot be used as a directory name.
    #[error("invalid command name '{0}'")]
    InvalidName(String),
    /// The command is not installed.
    #[error("command '{0}' is not installed")]
    NotFound(String),
    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] git::Error),
    /// The version specifier could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    /// The install record is invalid.
    #[error(transparent)]
    Record(#[from] LockError),
    /// The install record could not be encoded.
    #[error(transparent)]
    Encode(#[from] toml_edit::ser::Error),
    /// A filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Installs commands from git repositories into a commands directory.
pub struct GitInstaller<G> {
    git: G,
    fs: Arc<dyn FileSystem>,
    commands_dir: PathBuf,
    staging_dir: PathBuf,
    host: String,
}

enum Compensation {
    /// A staging clone, removed whatever the outcome.
    DropStaging(PathBuf),
    /// Freshly written output, removed on rollback.
    RemoveOutput(PathBuf),
    /// A previous install moved aside, put back on rollback and removed on success.
    Restore { backup: PathBuf, target: PathBuf },
}

/// The undo log of one install.
struct Saga<'a> {
    fs: &'a dyn FileSystem,
    steps: Vec<Compensation>,
}

//================================================================================================
// Impls
//================================================================================================

impl<G: GitClient> GitInstaller<G> {
    /// An installer writing into `commands_dir`, staging clones under `cache_root` and cloning
    /// from `host`.
    pub fn new(
        git: G,
        fs: Arc<dyn FileSystem>,
        commands_dir: impl Into<PathBuf>,
        cache_root: impl AsRef<Path>,
        host: impl Into<String>,
    ) -> Self {
        GitInstaller {
            git,
            fs,
            commands_dir: commands_dir.into(),
            staging_dir: cache_root.as_ref().join("staging"),
            host: host.into(),
        }
    }

    /// Where commands are installed.
    pub fn commands_dir(&self) -> &Path {
        &self.commands_dir
    }

    /// Install `repo` at `spec` as `name`, returning the written record.
    pub fn install_command(
        &self,
        repo: &Repo,
        spec: &str,
        name: &str,
    ) -> Result<LockEntry, InstallError> {
        let target = self.target(name)?;
        let staging = self.staging_dir.join(format!("{}-{}", name, std::process::id()));
        let mut saga = Saga::new(&*self.fs);

        match self.install_steps(&mut saga, repo, spec, name, &target, &staging) {
            Ok(entry) => {
                saga.finish();
                Ok(entry)
            },
            Err(e) => {
                tracing::warn!(command.name = %name, error = %e, "install failed, rolling back");
                saga.unwind();
                Err(e)
            },
        }
    }

    fn install_steps(
        &self,
        saga: &mut Saga<'_>,
        repo: &Repo,
        spec: &str,
        name: &str,
        target: &Path,
        staging: &Path,
    ) -> Result<LockEntry, InstallError> {
        remove_if_present(&*self.fs, staging)?;
        self.fs.create_dir_all(&self.staging_dir)?;
        saga.push(Compensation::DropStaging(staging.to_owned()));
        self.git.clone_repo(&git::remote_url(&self.host, repo), staging)?;

        let resolved = version::resolve_from(&self.git, staging, spec)?;
        self.git.checkout(staging, resolved.as_str())?;
        let commit = self.git.head_commit(staging)?;
        tracing::debug!(reference = %resolved, %commit, "checked out");

        let previous = self.read_record(target).ok().flatten();
        if self.fs.exists(target)? {
            let backup = self.commands_dir.join(format!(".{}.backup", name));
            remove_if_present(&*self.fs, &backup)?;
            self.fs.rename(target, &backup)?;
            saga.push(Compensation::Restore {
                backup,
                target: target.to_owned(),
            });
        }

        saga.push(Compensation::RemoveOutput(target.to_owned()));
        copy_tree(&*self.fs, staging, target)?;

        let now = Utc::now();
        let mut entry = LockEntry::new(repo, resolved.as_str(), commit, now);
        if let Some(previous) = previous.filter(|p| p.name == entry.name) {
            entry.installed_at = previous.installed_at;
        }
        entry.validate()?;

        let record = toml_edit::ser::to_string_pretty(&entry)?;
        self.fs
            .write_atomic(&target.join(INSTALL_RECORD_NAME), record.as_bytes(), false)?;
        Ok(entry)
    }

    /// Delete an installed command.
    pub fn remove_command(&self, name: &str) -> Result<(), InstallError> {
        let target = self.target(name)?;
        if !self.fs.is_dir(&target)? {
            return Err(InstallError::NotFound(name.to_owned()));
        }
        self.fs.remove_dir_all(&target)?;
        tracing::debug!(command.name = %name, "removed");
        Ok(())
    }

    /// The records of every installed command, skipping directories without a valid one.
    pub fn installed(&self) -> Result<Vec<LockEntry>, InstallError> {
        if !self.fs.is_dir(&self.commands_dir)? {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for dir in self.fs.read_dir(&self.commands_dir)? {
            let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.starts_with('.') || !self.fs.is_dir(&dir)? {
                continue;
            }
            match self.read_record(&dir) {
                Ok(Some(entry)) if entry.name == name => entries.push(entry),
                Ok(Some(entry)) => {
                    tracing::warn!(dir = %dir.display(), recorded = %entry.name, "install record names another command, skipping");
                },
                Ok(None) => {
                    tracing::debug!(dir = %dir.display(), "no install record, skipping");
                },
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "unreadable install record, skipping");
                },
            }
        }
        Ok(entries)
    }

    fn target(&self, name: &str) -> Result<PathBuf, InstallError> {
        if !repo::is_valid_name(name) {
            return Err(InstallError::InvalidName(name.to_owned()));
        }
        Ok(self.commands_dir.join(name))
    }

    fn read_record(&self, dir: &Path) -> Result<Option<LockEntry>, InstallError> {
        let Some(content) = self.fs.read_to_string_opt(&dir.join(INSTALL_RECORD_NAME))? else {
            return Ok(None);
        };
        let entry: LockEntry = toml_edit::de::from_str(&content).map_err(LockError::from)?;
        entry.validate()?;
        Ok(Some(entry))
    }
}

impl<G: GitClient> Installer for GitInstaller<G> {
    fn install(&self, repo: &Repo, spec: &str, name: &str) -> Result<LockEntry, BoxError> {
        Ok(self.install_command(repo, spec, name)?)
    }

    fn remove(&self, name: &str) -> Result<(), BoxError> {
        Ok(self.remove_command(name)?)
    }

    fn list_installed(&self) -> Result<Vec<LockEntry>, BoxError> {
        Ok(self.installed()?)
    }
}

impl<'a> Saga<'a> {
    fn new(fs: &'a dyn FileSystem) -> Self {
        Saga {
            fs,
            steps: Vec::new(),
        }
    }

    fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    /// Run every compensation in reverse order, logging the ones that fail.
    fn unwind(self) {
        for step in self.steps.into_iter().rev() {
            let result = match &step {
                Compensation::DropStaging(dir) | Compensation::RemoveOutput(dir) => {
                    remove_if_present(self.fs, dir)
                },
                Compensation::Restore { backup, target } => self.fs.rename(backup, target),
            };
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to roll back install step");
            }
        }
    }

    /// Drop the undo log, removing what only existed to make rollback possible.
    fn finish(self) {
        for step in self.steps {
            let leftover = match step {
                Compensation::DropStaging(dir) => dir,
                Compensation::Restore { backup, .. } => backup,
                Compensation::RemoveOutput(_) => continue,
            };
            if let Err(e) = remove_if_present(self.fs, &leftover) {
                tracing::warn!(dir = %leftover.display(), error = %e, "failed to clean up after install");
            }
        }
    }
}

//================================================================================================
// Functions
//================================================================================================

fn remove_if_present(fs: &dyn FileSystem, dir: &Path) -> std::io::Result<()> {
    match fs.exists(dir)? {
        true => fs.remove_dir_all(dir),
        false => Ok(()),
    }
}

/// Copy `from` into `to` recursively, leaving out `.git`.
fn copy_tree(fs: &dyn FileSystem, from: &Path, to: &Path) -> std::io::Result<()> {
    fs.create_dir_all(to)?;
    for path in fs.read_dir(from)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        if name == ".git" {
            continue;
        }
        let dest = to.join(name);
        if fs.is_dir(&path)? {
            copy_tree(fs, &path, &dest)?;
        } else {
            fs.write(&dest, &fs.read(&path)?)?;
        }
    }
    Ok(())
}
