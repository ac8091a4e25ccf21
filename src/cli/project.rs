//! This module locates the project the CLI operates on and wires up its stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ccmd_core::fs::{FileSystem, OsFs};
use ccmd_core::git::SystemGit;
use ccmd_core::install::GitInstaller;
use ccmd_core::lock::LockError;
use ccmd_core::{ConfigStore, LOCK_NAME, LockStore, MANIFEST_NAME};
use config::Config;

//================================================================================================
// Types
//================================================================================================

/// A project root with the settings that apply to it.
pub(super) struct Project {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    commands_dir: PathBuf,
    cache_root: PathBuf,
    host: String,
}

//================================================================================================
// Impls
//================================================================================================

impl Project {
    /// Find the project containing the current directory.
    ///
    /// The nearest ancestor holding a manifest is the root; without one, the current directory
    /// is, so that `init` and `add` can create the manifest there.
    pub(super) fn detect(config: &Config) -> anyhow::Result<Self> {
        let root = match find_upwards(MANIFEST_NAME) {
            Ok((root, manifest)) => {
                tracing::debug!(manifest = %manifest.display(), "found manifest");
                root
            },
            Err(_) => std::env::current_dir()?,
        };
        Ok(Project::at(root, Arc::new(OsFs), config))
    }

    /// A project rooted at `root`, accessed through `fs`.
    pub(super) fn at(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>, config: &Config) -> Self {
        let root = root.into();
        Project {
            commands_dir: config.commands_dir_in(&root),
            cache_root: config.cache.root.to_owned(),
            host: config.git.host.to_owned(),
            root,
            fs,
        }
    }

    pub(super) fn root(&self) -> &Path {
        &self.root
    }

    pub(super) fn manifest(&self) -> ConfigStore {
        ConfigStore::new(self.root.join(MANIFEST_NAME), self.fs.clone())
    }

    pub(super) fn lock(&self) -> Result<LockStore, LockError> {
        LockStore::open(self.root.join(LOCK_NAME), self.fs.clone())
    }

    pub(super) fn installer(&self) -> GitInstaller<SystemGit> {
        GitInstaller::new(
            SystemGit,
            self.fs.clone(),
            &self.commands_dir,
            &self.cache_root,
            &self.host,
        )
    }
}

//================================================================================================
// Functions
//================================================================================================

fn find_upwards(filename: &str) -> Result<(PathBuf, PathBuf), std::io::Error> {
    let start_dir = std::env::current_dir()?;

    for ancestor in start_dir.ancestors() {
        let file_path = ancestor.join(filename);
        if file_path.exists() {
            return Ok((ancestor.to_owned(), file_path));
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "could not locate a ccmd manifest",
    ))
}
