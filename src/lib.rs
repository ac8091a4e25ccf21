//! ccmd, a manager for agent slash commands distributed as git repositories.
//!
//! The binary declares commands in a `ccmd.toml` manifest, installs them from their remotes
//! and keeps a `ccmd.lock` ledger of what is actually on disk. See [`ccmd_core`] for the
//! models and the reconciler; this crate holds the command line front end.

#![warn(missing_docs)]

pub mod cli;
