//! # ccmd Core
//!
//! The `ccmd-core` crate provides the resolution and reconciliation engine behind `ccmd`, a
//! package manager for reusable command artifacts fetched from git repositories.
//!
//! ## Key Concepts
//!
//! **Commands** are declared in a manifest (`ccmd.toml`) as `owner/repo` references with an
//! optional version specifier. A specifier is resolved against the tags the repository
//! advertises, and may be an exact tag, a semantic version constraint, `latest`, or a branch
//! or commit which is passed through untouched.
//!
//! **The ledger** (`ccmd.lock`) records what is actually installed: the resolved reference,
//! the commit it was checked out at, and when it was installed or last updated.
//!
//! **Sync** diffs the manifest against the ledger, installs what is missing, removes what is
//! no longer declared, and then rebuilds the ledger from what the installer reports as
//! installed.
//!
//! ## Architecture
//!
//! - [`version`] - Resolves version specifiers against tag lists.
//! - [`repo`] - The validated `owner/name` repository path.
//! - [`manifest`] - The declared-dependency manifest and its order-preserving store.
//! - [`lock`] - The installed-state ledger and its atomic store.
//! - [`sync`] - The reconciler converging the ledger towards the manifest.
//! - [`fs`] - The filesystem abstraction all stores write through.
//! - [`git`] - A git client driving the system `git` binary.
//! - [`install`] - The installer materializing commands on disk.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ccmd_core::fs::OsFs;
//! use ccmd_core::lock::LockStore;
//! use ccmd_core::manifest::ConfigStore;
//!
//! let fs = Arc::new(OsFs);
//! let manifest = ConfigStore::new("ccmd.toml", fs.clone()).load().unwrap();
//! let lock = LockStore::open("ccmd.lock", fs).unwrap();
//! println!("{} declared, {} installed", manifest.config().commands().len(), lock.len());
//! ```

#![deny(missing_docs)]

pub use self::lock::{LockEntry, LockFile, LockStore};
pub use self::manifest::{Config, ConfigCommand, ConfigStore};
pub use self::repo::Repo;
pub use self::sync::Reconciler;

pub mod fs;
pub mod git;
pub mod install;
pub mod lock;
pub mod log;
pub mod manifest;
pub mod repo;
pub mod sync;
pub mod version;

/// The conventional filename for a command manifest.
pub const MANIFEST_NAME: &str = "ccmd.toml";
/// The conventional filename for the installed-state ledger.
pub const LOCK_NAME: &str = "ccmd.lock";
/// The filename of the per-command install record written by the installer.
pub const INSTALL_RECORD_NAME: &str = ".ccmd-install.toml";

/// An opaque error returned by collaborators the core treats as black boxes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
