//! Layered loading of [`RuntimeConfig`] with figment.
//!
//! Sources, lowest precedence first:
//!
//! 1. [`RuntimeConfig::default`]
//! 2. The runtime config file, `guildkit.toml` (`guildkit.yaml` or
//!    `guildkit.yml` with the `yaml-config` feature)
//! 3. Its deployment overlay `guildkit.<profile>.<ext>` in the same
//!    directory, when a profile is set through `GUILDKIT_PROFILE` or
//!    [`ConfigLoader::profile`]
//! 4. `GUILDKIT_*` environment variables, `__` separating nested keys
//! 5. [`ConfigLoader::set`] and [`ConfigLoader::merge`]
//!
//! Unless [`ConfigLoader::file`] names the file, it is looked up in the
//! current directory and then in `<user config dir>/guildkit`. Only the first
//! directory that has one is used.
//!
//! ```text
//! GUILDKIT_CONCURRENT_GUILD_LOAD_LIMIT=8  ->  concurrent_guild_load_limit = 8
//! GUILDKIT_LOGGING__SPANS=timing          ->  logging.spans = "timing"
//! ```
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .set("logging.level", "debug")
//!     .load()?;
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::RuntimeConfig;
use super::validation::validate_config;

const ENV_PREFIX: &str = "GUILDKIT_";
const PROFILE_VAR: &str = "GUILDKIT_PROFILE";
const FILE_STEM: &str = "guildkit";

/// File extensions of the enabled formats, in lookup order.
#[allow(unused_mut)]
fn extensions() -> Vec<&'static str> {
    let mut extensions = Vec::new();
    #[cfg(feature = "toml-config")]
    extensions.push("toml");
    #[cfg(feature = "yaml-config")]
    extensions.extend(["yaml", "yml"]);
    extensions
}

fn default_dirs() -> Vec<PathBuf> {
    std::env::current_dir()
        .ok()
        .into_iter()
        .chain(dirs::config_dir().map(|dir| dir.join(FILE_STEM)))
        .collect()
}

#[derive(Debug)]
enum FileSource {
    /// Look in these directories, or the default ones when empty.
    Search(Vec<PathBuf>),
    Exact(PathBuf),
    Skip,
}

/// Builds a [`RuntimeConfig`] from files, environment and code.
pub struct ConfigLoader {
    file: FileSource,
    profile: Option<String>,
    env: bool,
    overrides: Figment,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader with the default lookup, the profile from
    /// `GUILDKIT_PROFILE` and environment variables enabled.
    pub fn new() -> Self {
        Self {
            file: FileSource::Search(Vec::new()),
            profile: std::env::var(PROFILE_VAR)
                .ok()
                .filter(|profile| !profile.is_empty())
                .map(|profile| profile.to_lowercase()),
            env: true,
            overrides: Figment::new(),
        }
    }

    /// Selects the deployment overlay, e.g. `production` for
    /// `guildkit.production.toml`.
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into().to_lowercase());
        self
    }

    /// Looks for the config file in `dir`. Replaces the default directories;
    /// repeated calls are searched in order.
    pub fn search_path(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        match &mut self.file {
            FileSource::Search(dirs) => dirs.push(dir),
            other => *other = FileSource::Search(vec![dir]),
        }
        self
    }

    /// Reads exactly this file. Loading fails if it does not exist.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = FileSource::Exact(path.as_ref().to_path_buf());
        self
    }

    /// Skips config files, and with them the profile overlay.
    pub fn without_files(mut self) -> Self {
        self.file = FileSource::Skip;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.env = false;
        self
    }

    /// Sets one key, e.g. `set("logging.level", "debug")`. Wins over files
    /// and environment.
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Replaces every key with the values of `config`. Wins over files and
    /// environment.
    pub fn merge(mut self, config: RuntimeConfig) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(config));
        self
    }

    /// The files [`load`](Self::load) would read, base file first.
    pub fn files(&self) -> ConfigResult<Vec<PathBuf>> {
        let base = match &self.file {
            FileSource::Skip => return Ok(Vec::new()),
            FileSource::Exact(path) if path.is_file() => path.clone(),
            FileSource::Exact(path) => return Err(ConfigError::FileNotFound(path.clone())),
            FileSource::Search(dirs) if dirs.is_empty() => match find_base(&default_dirs()) {
                Some(path) => path,
                None => return Ok(Vec::new()),
            },
            FileSource::Search(dirs) => match find_base(dirs) {
                Some(path) => path,
                None => return Ok(Vec::new()),
            },
        };
        let overlay = self.overlay_for(&base);
        Ok(std::iter::once(base).chain(overlay).collect())
    }

    fn overlay_for(&self, base: &Path) -> Option<PathBuf> {
        let profile = self.profile.as_deref()?;
        let stem = base.file_stem().and_then(OsStr::to_str)?;
        let extension = base.extension().and_then(OsStr::to_str)?;
        let overlay = base.with_file_name(format!("{stem}.{profile}.{extension}"));
        overlay.is_file().then_some(overlay)
    }

    /// Merges every source and validates the result.
    pub fn load(self) -> ConfigResult<RuntimeConfig> {
        let files = self.files()?;
        let mut figment = Figment::from(Serialized::defaults(RuntimeConfig::default()));
        for path in &files {
            debug!(path = %path.display(), "Merging runtime config file");
            figment = merge_file(figment, path)?;
        }
        if files.is_empty() {
            debug!("No runtime config file found");
        }
        if self.env {
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["PROFILE"])
                    .split("__"),
            );
        }

        let config: RuntimeConfig = figment.merge(self.overrides).extract()?;
        validate_config(&config)?;

        info!(
            profile = self.profile.as_deref().unwrap_or("none"),
            files = ?files,
            load_limit = ?config.concurrent_guild_load_limit,
            "Runtime config loaded"
        );
        Ok(config)
    }
}

fn find_base(dirs: &[PathBuf]) -> Option<PathBuf> {
    let extensions = extensions();
    dirs.iter()
        .flat_map(|dir| {
            extensions
                .iter()
                .map(move |extension| dir.join(format!("{FILE_STEM}.{extension}")))
        })
        .find(|path| path.is_file())
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    match path.extension().and_then(OsStr::to_str) {
        #[cfg(feature = "toml-config")]
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        #[cfg(feature = "yaml-config")]
        Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
        _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
    }
}
