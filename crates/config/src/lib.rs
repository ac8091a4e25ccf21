//! Manages application configuration by loading settings from standard locations.
//!
//! This crate provides the `Config` object that aggregates the embedded defaults, the user's
//! configuration file and `CCMD_*` environment variables. It is loaded once by the binary and
//! handed to whatever needs it.

#[cfg(test)]
mod test;

use std::path::{Path, PathBuf};

use etcetera::BaseStrategy;
use figment::providers::{Env, Format, Toml};
use figment::{Figment, Metadata, Provider};
use serde::{Deserialize, Serialize};

/// The default configuration values
const DEFAULT_TOML_CONFIG: &str = include_str!("./ccmd.default.toml");

/// The prefix of environment variables overriding settings; nested keys are split on `__`.
pub const ENV_PREFIX: &str = "CCMD_";

//================================================================================================
// Types
//================================================================================================

/// Defines cache-related configuration settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// The root directory for staging clones.
    pub root: PathBuf,
}

/// Defines how repositories are reached.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GitConfig {
    /// The host `owner/name` paths are resolved against.
    pub host: String,
}

/// Represents the application's primary configuration structure.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where commands are installed, relative to the project root unless absolute.
    pub commands_dir: PathBuf,
    /// Git settings.
    #[serde(default)]
    pub git: GitConfig,
    /// Cache-related settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: get_cache_dir(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            host: "https://github.com".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commands_dir: PathBuf::from(".claude/commands"),
            git: GitConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Constructs a `Figment` instance for configuration loading.
    ///
    /// This method builds a configuration provider by layering default settings,
    /// the user-specific configuration file, and environment variables.
    pub fn figment() -> Figment {
        let user = etcetera::choose_base_strategy()
            .ok()
            .map(|c| c.config_dir().join("ccmd").join("config.toml"));
        Config::layered(user.as_deref())
    }

    /// The layered provider with an explicit user configuration file.
    pub fn layered(user_config: Option<&Path>) -> Figment {
        let mut fig = Figment::from(Config::default()).merge(Toml::string(DEFAULT_TOML_CONFIG));

        if let Some(config) = user_config {
            fig = fig.admerge(Toml::file(config));
        }

        fig.admerge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Creates a `Config` instance from a given provider.
    pub fn from<T: Provider>(provider: T) -> Result<Config, Box<figment::Error>> {
        Figment::from(provider).extract().map_err(Box::new)
    }

    /// Loads the configuration from the default sources, falling back to the built-in
    /// defaults if any source is malformed.
    pub fn load() -> Config {
        Config::figment().extract().unwrap_or_else(|e| {
            tracing::error!(error = %e, "problem loading config from default sources, falling back to defaults");
            Config::default()
        })
    }

    /// The commands directory, resolved against `root` when relative.
    pub fn commands_dir_in(&self, root: &Path) -> PathBuf {
        root.join(&self.commands_dir)
    }
}

impl Provider for Config {
    fn metadata(&self) -> figment::Metadata {
        Metadata::named("ccmd config")
    }

    fn data(
        &self,
    ) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        figment::providers::Serialized::defaults(self).data()
    }
}

//================================================================================================
// Functions
//================================================================================================

/// Determines the appropriate cache directory based on the operating system.
fn get_cache_dir() -> PathBuf {
    if let Ok(c) = etcetera::choose_base_strategy() {
        c.cache_dir().join("ccmd")
    } else {
        std::env::temp_dir().join("ccmd")
    }
}
