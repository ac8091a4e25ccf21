//! # Command Ledger
//!
//! This module provides the types for the installed-state ledger (`ccmd.lock`) and the store
//! guarding it. The ledger is authoritative: it records exactly what was installed, at which
//! reference and commit, and is never inferred from the manifest.
//!
//! ## Example Ledger
//!
//! ```toml
//! version = "1.0"
//! lockfileVersion = 1
//!
//! [commands.review]
//! name = "review"
//! version = "v1.0.0"
//! source = "acme/review"
//! resolved = "acme/review@v1.0.0"
//! commit = "0123456789abcdef0123456789abcdef01234567"
//! installed_at = "2026-01-01T00:00:00Z"
//! updated_at = "2026-01-01T00:00:00Z"
//! ```
//!
//! ## Integrity
//!
//! - every entry is keyed by its own name
//! - `commit` is a full 40 character hexadecimal object id
//! - `resolved` is always `source@version`
//! - timestamps are set
//!
//! These rules are checked whenever a ledger is loaded, an entry is added, or the ledger is
//! saved. A rejected entry never reaches the in-memory map. Saves go through
//! [`write_atomic`](crate::fs::FileSystem::write_atomic) with owner-only permissions.


use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use hex::FromHex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs::FileSystem;
use crate::repo::{self, Repo};

//================================================================================================
// Statics
//================================================================================================

/// The ledger format version written to new ledgers.
pub const FORMAT_VERSION: &str = "1.0";

/// The newest `lockfileVersion` this build understands.
pub const LOCKFILE_VERSION: u32 = 1;

//================================================================================================
// Types
//================================================================================================

/// An error that can occur when loading, validating or persisting the ledger.
#[derive(Error, Debug)]
pub enum LockError {
    /// The ledger could not be decoded.
    #[error(transparent)]
    Decode(#[from] toml_edit::de::Error),
    /// The ledger could not be encoded.
    #[error(transparent)]
    Encode(#[from] toml_edit::ser::Error),
    /// An entry violated an integrity rule.
    #[error("invalid ledger entry '{name}': {reason}")]
    InvalidEntry {
        /// The entry's name, or its key when the name itself is at fault.
        name: String,
        /// The rule it broke.
        reason: String,
    },
    /// The ledger was written by a newer version of the tool.
    #[error("unsupported lockfileVersion {found}, this build understands up to {supported}")]
    Unsupported {
        /// The revision found in the ledger.
        found: u32,
        /// The newest revision understood.
        supported: u32,
    },
    /// An I/O error occurred while reading or writing the ledger.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized result type for ledger operations.
pub type LockResult<T> = Result<T, LockError>;

/// A record of one installed command.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockEntry {
    /// The command name, equal to its key in the ledger.
    pub name: String,
    /// The reference that was actually checked out.
    pub version: String,
    /// The repository the command came from.
    pub source: Repo,
    /// `source@version`.
    pub resolved: String,
    /// The full commit id that was checked out.
    pub commit: String,
    /// When the command was first installed.
    pub installed_at: DateTime<Utc>,
    /// When the command was last installed or updated.
    pub updated_at: DateTime<Utc>,
    /// Other commands this one relies on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// The full ledger.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockFile {
    /// The ledger format version.
    pub version: String,
    /// The ledger schema revision.
    #[serde(rename = "lockfileVersion")]
    pub lockfile_version: u32,
    /// Installed commands keyed by name.
    #[serde(default)]
    pub commands: BTreeMap<String, LockEntry>,
}

/// Owns the ledger at a fixed path for a load, mutate, save cycle.
pub struct LockStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
    state: RwLock<LockFile>,
}

//================================================================================================
// Impls
//================================================================================================

impl LockEntry {
    /// A freshly installed entry for `repo` at `version`, stamped with `at`.
    pub fn new(
        repo: &Repo,
        version: impl Into<String>,
        commit: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        let version = version.into();
        LockEntry {
            name: repo.name().to_owned(),
            resolved: format!("{}@{}", repo, version),
            version,
            source: repo.to_owned(),
            commit: commit.into(),
            installed_at: at,
            updated_at: at,
            dependencies: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Check the entry against the ledger's integrity rules.
    pub fn validate(&self) -> LockResult<()> {
        let invalid = |reason: &str| {
            Err(LockError::InvalidEntry {
                name: self.name.to_owned(),
                reason: reason.to_owned(),
            })
        };

        if self.name.is_empty() {
            return invalid("the name is empty");
        }
        if !repo::is_valid_name(&self.name) {
            return invalid("the name contains characters outside [A-Za-z0-9_-]");
        }
        if self.version.trim().is_empty() {
            return invalid("the version is empty");
        }
        if <[u8; 20]>::from_hex(&self.commit).is_err() {
            return invalid("the commit is not a 40 character hexadecimal id");
        }
        if self.resolved != format!("{}@{}", self.source, self.version) {
            return invalid("`resolved` does not equal `source@version`");
        }
        if self.installed_at.timestamp() <= 0 || self.updated_at.timestamp() <= 0 {
            return invalid("timestamps must be set");
        }
        Ok(())
    }
}

impl Default for LockFile {
    fn default() -> Self {
        LockFile {
            version: FORMAT_VERSION.to_owned(),
            lockfile_version: LOCKFILE_VERSION,
            commands: BTreeMap::new(),
        }
    }
}

impl LockFile {
    /// Decode and validate a ledger.
    pub fn parse(content: &str) -> LockResult<Self> {
        let file: LockFile = toml_edit::de::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Check every entry and the schema revision.
    pub fn validate(&self) -> LockResult<()> {
        if self.lockfile_version > LOCKFILE_VERSION {
            return Err(LockError::Unsupported {
                found: self.lockfile_version,
                supported: LOCKFILE_VERSION,
            });
        }
        for (key, entry) in &self.commands {
            if key != &entry.name {
                return Err(LockError::InvalidEntry {
                    name: key.to_owned(),
                    reason: format!("keyed under '{}' but named '{}'", key, entry.name),
                });
            }
            entry.validate()?;
        }
        Ok(())
    }

    /// Encode the ledger as TOML.
    pub fn to_toml(&self) -> LockResult<String> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }
}

impl LockStore {
    /// Load the ledger at `path`, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> LockResult<Self> {
        let store = LockStore {
            path: path.into(),
            fs,
            state: RwLock::new(LockFile::default()),
        };
        store.load()?;
        Ok(store)
    }

    /// The ledger path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the ledger from disk, replacing the in-memory state.
    ///
    /// A missing file yields an empty ledger; a present one must decode and validate.
    pub fn load(&self) -> LockResult<()> {
        let file = match self.fs.read_to_string_opt(&self.path)? {
            Some(content) => LockFile::parse(&content).inspect_err(|e| {
                tracing::error!(ledger = %self.path.display(), error = %e, "invalid ledger");
            })?,
            None => {
                tracing::debug!(ledger = %self.path.display(), "no ledger found, starting empty");
                LockFile::default()
            },
        };
        *self.write() = file;
        Ok(())
    }

    /// Validate and atomically persist the ledger with owner-only permissions.
    pub fn save(&self) -> LockResult<()> {
        let content = {
            let state = self.read();
            state.validate()?;
            state.to_toml()?
        };
        self.fs.write_atomic(&self.path, content.as_bytes(), true)?;
        tracing::debug!(ledger = %self.path.display(), "wrote ledger");
        Ok(())
    }

    /// Validate and insert an entry, returning the one it replaced.
    pub fn add_command(&self, entry: LockEntry) -> LockResult<Option<LockEntry>> {
        entry.validate()?;
        Ok(self.write().commands.insert(entry.name.to_owned(), entry))
    }

    /// Drop an entry, returning it if present.
    pub fn remove_command(&self, name: &str) -> Option<LockEntry> {
        self.write().commands.remove(name)
    }

    /// A copy of the named entry.
    pub fn get_command(&self, name: &str) -> Option<LockEntry> {
        self.read().commands.get(name).cloned()
    }

    /// Every entry, ordered by name.
    pub fn list_commands(&self) -> Vec<LockEntry> {
        self.read().commands.values().cloned().collect()
    }

    /// Swap in a whole new set of entries, validating all of them first.
    pub fn replace(&self, entries: impl IntoIterator<Item = LockEntry>) -> LockResult<()> {
        let mut commands = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            if let Some(previous) = commands.insert(entry.name.to_owned(), entry) {
                return Err(LockError::InvalidEntry {
                    name: previous.name,
                    reason: "recorded more than once".to_owned(),
                });
            }
        }
        self.write().commands = commands;
        Ok(())
    }

    /// A copy of the current ledger.
    pub fn snapshot(&self) -> LockFile {
        self.read().clone()
    }

    /// The number of recorded commands.
    pub fn len(&self) -> usize {
        self.read().commands.len()
    }

    /// Whether no command is recorded.
    pub fn is_empty(&self) -> bool {
        self.read().commands.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LockFile> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LockFile> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
