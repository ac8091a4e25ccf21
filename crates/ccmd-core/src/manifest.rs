//! # Command Manifest
//!
//! This module provides the types for the declared-dependency manifest (`ccmd.toml`) and the
//! store that reads, validates and rewrites it.
//!
//! ## Manifest Structure
//!
//! The manifest is a TOML document with an optional set of free-form project fields and a
//! `commands` array. Each command is written either as a string or as a table:
//!
//! ```toml
//! name = "my-project"
//! description = "commands shared by the team"
//!
//! commands = ["owner/review", "owner/deploy@^1.2"]
//! ```
//!
//! ```toml
//! [[commands]]
//! repo = "owner/review"
//!
//! [[commands]]
//! repo = "owner/deploy"
//! version = "^1.2"
//! ```
//!
//! Both shapes decode to the same list of [`ConfigCommand`]s. Unknown top-level fields are
//! rejected.
//!
//! ## Order Preservation
//!
//! A [`ConfigDocument`] keeps the parsed `toml_edit` document alongside the validated
//! [`Config`]. Mutations edit only the `commands` key of that document, so every other field
//! keeps its position, comments and formatting however many times commands are added, updated
//! or removed.

#[cfg(test)]
mod test;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml_edit::{Array, DocumentMut};

use crate::fs::FileSystem;
use crate::repo::{Repo, RepoError};
use crate::version::{self, Constraint, LATEST};

//================================================================================================
// Types
//================================================================================================

/// An error that can occur when parsing or mutating a manifest.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No manifest exists at the expected path.
    #[error("no manifest found at {}", .0.display())]
    Missing(PathBuf),
    /// A manifest already exists where a new one was requested.
    #[error("a manifest already exists at {}", .0.display())]
    Exists(PathBuf),
    /// The manifest is not valid TOML.
    #[error(transparent)]
    InvalidToml(#[from] toml_edit::TomlError),
    /// The manifest does not match the expected schema.
    #[error(transparent)]
    Schema(#[from] toml_edit::de::Error),
    /// A command's repository path is malformed.
    #[error(transparent)]
    Repo(#[from] RepoError),
    /// A command's version specifier is malformed.
    #[error("invalid version specifier '{spec}': {reason}")]
    InvalidVersion {
        /// The offending specifier.
        spec: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// The repository is already declared.
    #[error("command '{0}' is already declared")]
    Duplicate(Repo),
    /// The repository is not declared.
    #[error("command '{0}' is not declared in the manifest")]
    NotFound(String),
    /// The `commands` key holds something other than an array.
    #[error("the `commands` field must be an array")]
    NotAnArray,
    /// An I/O error occurred while reading or writing the manifest.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A specialized result type for manifest operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A declared dependency: a repository and an optional version specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigCommand {
    repo: Repo,
    version: Option<String>,
}

/// The free-form project fields of a manifest.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// The project name.
    pub name: Option<String>,
    /// The project version.
    pub version: Option<String>,
    /// A short description.
    pub description: Option<String>,
    /// The author.
    pub author: Option<String>,
    /// Where the project lives.
    pub repository: Option<String>,
    /// The entry point, for repositories which are themselves commands.
    pub entry: Option<String>,
    /// Free-form tags.
    pub tags: Option<Vec<String>>,
}

/// The validated content of a manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    metadata: Metadata,
    commands: Vec<ConfigCommand>,
}

/// A manifest document paired with its validated [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    doc: DocumentMut,
    config: Config,
}

/// Reads and writes the manifest at a fixed path.
#[derive(Clone)]
pub struct ConfigStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

/// The on-disk shape of the manifest.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    author: Option<String>,
    repository: Option<String>,
    entry: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(default)]
    commands: RawCommands,
}

/// The two accepted encodings of the `commands` array, tried in order.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum RawCommands {
    Flat(Vec<String>),
    Tables(Vec<CommandTable>),
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct CommandTable {
    repo: String,
    #[serde(default)]
    version: Option<String>,
}

//================================================================================================
// Impls
//================================================================================================

impl ConfigCommand {
    /// Declare `repo` at the given version specifier, validating the specifier.
    pub fn new(repo: Repo, version: Option<String>) -> ConfigResult<Self> {
        let version = version.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());
        if let Some(spec) = &version {
            validate_version_spec(spec)?;
        }
        Ok(ConfigCommand { repo, version })
    }

    /// The declared repository.
    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    /// The command name, which keys the command in the ledger.
    pub fn name(&self) -> &str {
        self.repo.name()
    }

    /// The specifier as written, if any.
    pub fn declared_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The specifier to resolve, defaulting to `latest`.
    pub fn version_spec(&self) -> &str {
        self.version.as_deref().unwrap_or(LATEST)
    }

    /// Whether `key` names this command, either by repository or by command name.
    pub fn is_named(&self, key: &str) -> bool {
        self.repo.to_string() == key || self.name() == key
    }
}

impl fmt::Display for ConfigCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.repo, v),
            None => write!(f, "{}", self.repo),
        }
    }
}

impl FromStr for ConfigCommand {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (repo, version) = match s.trim().split_once('@') {
            Some((repo, version)) => (repo, Some(version.to_owned())),
            None => (s.trim(), None),
        };
        ConfigCommand::new(repo.parse()?, version)
    }
}

impl Config {
    /// The declared commands, in manifest order.
    pub fn commands(&self) -> &[ConfigCommand] {
        &self.commands
    }

    /// The free-form project fields.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The first command declared under `key` (a repository path or a command name).
    pub fn find(&self, key: &str) -> Option<&ConfigCommand> {
        self.commands.iter().find(|c| c.is_named(key))
    }

    /// Whether `repo` is declared.
    pub fn contains(&self, repo: &Repo) -> bool {
        self.commands.iter().any(|c| c.repo() == repo)
    }
}

impl TryFrom<RawManifest> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawManifest) -> Result<Self, Self::Error> {
        let commands = match raw.commands {
            RawCommands::Flat(entries) => entries
                .iter()
                .map(|s| s.parse())
                .collect::<ConfigResult<Vec<_>>>()?,
            RawCommands::Tables(tables) => tables
                .into_iter()
                .map(|t| ConfigCommand::new(t.repo.parse()?, t.version))
                .collect::<ConfigResult<Vec<_>>>()?,
        };
        Ok(Config {
            metadata: Metadata {
                name: raw.name,
                version: raw.version,
                description: raw.description,
                author: raw.author,
                repository: raw.repository,
                entry: raw.entry,
                tags: raw.tags,
            },
            commands,
        })
    }
}

impl Default for RawCommands {
    fn default() -> Self {
        RawCommands::Flat(Vec::new())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml_edit::de::from_str::<RawManifest>(s)?.try_into()
    }
}

impl ConfigDocument {
    /// Parse and validate a manifest, keeping its document for order-preserving edits.
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let doc = content.parse::<DocumentMut>()?;
        let config = content.parse::<Config>()?;
        Ok(ConfigDocument { doc, config })
    }

    /// A document holding only an empty `commands` array.
    pub fn empty() -> Self {
        let mut doc = DocumentMut::new();
        doc.insert("commands", toml_edit::value(Array::new()));
        ConfigDocument {
            doc,
            config: Config::default(),
        }
    }

    /// A new manifest with an optional project name.
    pub fn with_name(name: Option<String>) -> Self {
        let mut doc = DocumentMut::new();
        if let Some(name) = &name {
            doc.insert("name", toml_edit::value(name.as_str()));
        }
        doc.insert("commands", toml_edit::value(Array::new()));
        ConfigDocument {
            doc,
            config: Config {
                metadata: Metadata {
                    name,
                    ..Default::default()
                },
                commands: Vec::new(),
            },
        }
    }

    /// The validated manifest content.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Declare a new command. Fails if its repository is already declared.
    pub fn add(&mut self, command: ConfigCommand) -> ConfigResult<()> {
        if self.config.contains(command.repo()) {
            return Err(ConfigError::Duplicate(command.repo().to_owned()));
        }
        self.commands_array()?.push(command.to_string());
        self.config.commands.push(command);
        Ok(())
    }

    /// Remove every declaration of `repo`, returning the first one removed.
    pub fn remove(&mut self, repo: &Repo) -> ConfigResult<ConfigCommand> {
        let removed = self
            .config
            .commands
            .iter()
            .find(|c| c.repo() == repo)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(repo.to_string()))?;

        let array = self.commands_array()?;
        let positions = matching_positions(array, repo);
        for index in positions.into_iter().rev() {
            array.remove(index);
        }
        self.config.commands.retain(|c| c.repo() != repo);
        Ok(removed)
    }

    /// Change the version specifier of `repo`, returning its previous declaration.
    pub fn update(&mut self, repo: &Repo, version: Option<String>) -> ConfigResult<ConfigCommand> {
        let previous = self
            .config
            .commands
            .iter()
            .find(|c| c.repo() == repo)
            .cloned()
            .ok_or_else(|| ConfigError::NotFound(repo.to_string()))?;
        let updated = ConfigCommand::new(repo.to_owned(), version)?;

        let array = self.commands_array()?;
        for index in matching_positions(array, repo) {
            array.replace(index, updated.to_string());
        }
        for command in self.config.commands.iter_mut().filter(|c| c.repo() == repo) {
            *command = updated.clone();
        }
        Ok(previous)
    }

    /// The `commands` array of the document in string form, converting the table form or
    /// creating the key if needed.
    fn commands_array(&mut self) -> ConfigResult<&mut Array> {
        let is_flat = self
            .doc
            .get("commands")
            .and_then(|item| item.as_array())
            .is_some_and(|array| array.iter().all(|v| v.is_str()));

        if !is_flat {
            let canonical: Array = self.config.commands.iter().map(|c| c.to_string()).collect();
            self.doc.insert("commands", toml_edit::value(canonical));
        }

        self.doc
            .get_mut("commands")
            .and_then(|item| item.as_array_mut())
            .ok_or(ConfigError::NotAnArray)
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.doc)
    }
}

impl ConfigStore {
    /// A store for the manifest at `path`.
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        ConfigStore {
            path: path.into(),
            fs,
        }
    }

    /// The manifest path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a manifest exists.
    pub fn exists(&self) -> ConfigResult<bool> {
        Ok(self.fs.exists(&self.path)?)
    }

    /// Load and validate the manifest, failing if it does not exist.
    pub fn load(&self) -> ConfigResult<ConfigDocument> {
        self.load_opt()?
            .ok_or_else(|| ConfigError::Missing(self.path.to_owned()))
    }

    /// Load and validate the manifest, or `None` if it does not exist.
    pub fn load_opt(&self) -> ConfigResult<Option<ConfigDocument>> {
        let Some(content) = self.fs.read_to_string_opt(&self.path)? else {
            return Ok(None);
        };
        ConfigDocument::parse(&content)
            .inspect_err(|e| {
                tracing::error!(manifest = %self.path.display(), error = %e, "invalid manifest");
            })
            .map(Some)
    }

    /// Atomically write the document back.
    pub fn save(&self, doc: &ConfigDocument) -> ConfigResult<()> {
        self.fs.write_atomic(&self.path, doc.to_string().as_bytes(), false)?;
        tracing::debug!(manifest = %self.path.display(), "wrote manifest");
        Ok(())
    }

    /// Create a new manifest, refusing to overwrite an existing one.
    pub fn init(&self, name: Option<String>) -> ConfigResult<ConfigDocument> {
        if self.exists()? {
            return Err(ConfigError::Exists(self.path.to_owned()));
        }
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs.create_dir_all(dir)?;
        }
        let doc = ConfigDocument::with_name(name);
        self.save(&doc)?;
        Ok(doc)
    }

    /// Declare a command, creating a minimal manifest if none exists yet.
    pub fn add(&self, command: ConfigCommand) -> ConfigResult<ConfigDocument> {
        let mut doc = self.load_opt()?.unwrap_or_else(ConfigDocument::empty);
        doc.add(command)?;
        self.save(&doc)?;
        Ok(doc)
    }

    /// Undeclare a command.
    pub fn remove(&self, repo: &Repo) -> ConfigResult<ConfigCommand> {
        let mut doc = self.load()?;
        let removed = doc.remove(repo)?;
        self.save(&doc)?;
        Ok(removed)
    }

    /// Change the version specifier of a declared command.
    pub fn update(&self, repo: &Repo, version: Option<String>) -> ConfigResult<ConfigCommand> {
        let mut doc = self.load()?;
        let previous = doc.update(repo, version)?;
        self.save(&doc)?;
        Ok(previous)
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Check the syntax of a version specifier.
///
/// `latest`, semantic versions and semantic version constraints are always accepted. Anything
/// else must look like a git reference: ASCII letters, digits and `._/+-`, with no empty
/// dot-separated component.
pub fn validate_version_spec(spec: &str) -> ConfigResult<()> {
    let invalid = |reason| {
        Err(ConfigError::InvalidVersion {
            spec: spec.to_owned(),
            reason,
        })
    };

    if spec.is_empty() {
        return invalid("the specifier is empty");
    }
    if spec == LATEST || version::parse_tag(spec).is_some() {
        return Ok(());
    }
    if version::is_constraint(spec) && Constraint::parse(spec).is_ok() {
        return Ok(());
    }
    if !spec
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '/' | '+' | '-'))
    {
        return invalid("it contains characters not allowed in a version or git reference");
    }
    if spec.contains("..") {
        return invalid("it contains consecutive dots");
    }
    if spec.starts_with('.') || spec.ends_with('.') {
        return invalid("it starts or ends with a dot");
    }
    Ok(())
}

fn matching_positions(array: &Array, repo: &Repo) -> Vec<usize> {
    array
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
            let command = v.as_str()?.parse::<ConfigCommand>().ok()?;
            (command.repo() == repo).then_some(i)
        })
        .collect()
}
