//! # Repository Paths
//!
//! A [`Repo`] is the `owner/name` reference used to declare a command in the manifest and to
//! record its origin in the ledger. It is validated on construction so that every other layer
//! can rely on its shape.
//!
//! ## Validation Rules
//!
//! - exactly one `/` separating owner and name
//! - owner and name are both non-empty
//! - owner and name contain only ASCII letters, digits, `-` and `_`
//!
//! The `name` half doubles as the command's key in the ledger and as its install directory.

#[cfg(test)]
mod test;

use std::fmt;
use std::str::FromStr;

use lazy_regex::{Lazy, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

//================================================================================================
// Statics
//================================================================================================

static SEGMENT: Lazy<Regex> = lazy_regex::lazy_regex!(r"^[A-Za-z0-9_-]+$");

//================================================================================================
// Types
//================================================================================================

/// A vetted `owner/name` repository path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Repo {
    owner: String,
    name: String,
}

/// Errors produced when a string is not a valid repository path.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RepoError {
    /// The path was empty.
    #[error("repository path cannot be empty")]
    Empty,
    /// The path did not contain exactly one `/`.
    #[error("repository path must have the form `owner/name`: '{0}'")]
    Shape(String),
    /// The owner segment was empty.
    #[error("repository owner cannot be empty: '{0}'")]
    EmptyOwner(String),
    /// The name segment was empty.
    #[error("repository name cannot be empty: '{0}'")]
    EmptyName(String),
    /// A segment contained characters outside `[A-Za-z0-9_-]`.
    #[error("repository path contains invalid characters: '{0}'")]
    InvalidCharacters(String),
}

//================================================================================================
// Impls
//================================================================================================

impl Repo {
    /// The owner half of the path.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The name half of the path, also used as the command name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for Repo {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(RepoError::Empty);
        }
        let mut parts = s.split('/');
        let (owner, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => (owner, name),
            _ => return Err(RepoError::Shape(s.to_owned())),
        };
        if owner.is_empty() {
            return Err(RepoError::EmptyOwner(s.to_owned()));
        }
        if name.is_empty() {
            return Err(RepoError::EmptyName(s.to_owned()));
        }
        if !SEGMENT.is_match(owner) || !SEGMENT.is_match(name) {
            return Err(RepoError::InvalidCharacters(s.to_owned()));
        }
        Ok(Repo {
            owner: owner.to_owned(),
            name: name.to_owned(),
        })
    }
}

impl TryFrom<String> for Repo {
    type Error = RepoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for Repo {
    type Error = RepoError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Repo> for String {
    fn from(repo: Repo) -> Self {
        repo.to_string()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Whether `name` is usable as a command name (the `name` half of a [`Repo`]).
pub fn is_valid_name(name: &str) -> bool {
    SEGMENT.is_match(name)
}
