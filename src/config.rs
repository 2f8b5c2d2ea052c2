//! `strata.toml` configuration.
//!
//! ```toml
//! environment = "development"
//!
//! [database]
//! url = "sqlite://app.db?mode=rwc"
//! ledger_table = "migrations"
//!
//! [migrations]
//! path = "migrations"
//! vendor_paths = ["vendor/acme/migrations"]
//!
//! [seeds]
//! path = "seeds"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::ledger::DEFAULT_LEDGER_TABLE;
use crate::scanner::DEFAULT_EXTENSION;

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = "strata.toml";

/// Environment in which destructive commands run without `--force`.
pub const DEVELOPMENT: &str = "development";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub environment: String,
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
    pub seeds: SeedsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: DEVELOPMENT.to_string(),
            database: DatabaseConfig::default(),
            migrations: MigrationsConfig::default(),
            seeds: SeedsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL; may be overridden on the command line.
    pub url: Option<String>,
    pub ledger_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Primary migration directory.
    pub path: PathBuf,
    /// Extra directories contributed by vendored packages, scanned after `path`.
    pub vendor_paths: Vec<PathBuf>,
    pub extension: String,
    /// Refuse to run when two directories contribute the same migration name.
    pub deny_shadowing: bool,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("migrations"),
            vendor_paths: Vec::new(),
            extension: DEFAULT_EXTENSION.to_string(),
            deny_shadowing: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SeedsConfig {
    pub path: PathBuf,
}

impl Default for SeedsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("seeds"),
        }
    }
}

impl Config {
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let mut config: Config = toml::from_str(content).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.resolve_relative_to(origin.parent().unwrap_or(Path::new("")));
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&content, path)
    }

    /// Load the first configuration found: `explicit`, `./strata.toml`, then
    /// the user config directory. Falls back to defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Self::from_file(&local);
        }

        if let Some(global) = dirs::config_dir().map(|d| d.join("strata").join("config.toml"))
            && global.is_file()
        {
            return Self::from_file(&global);
        }

        Ok(Self::default())
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case(DEVELOPMENT)
    }

    /// Relative paths in a config file are relative to that file.
    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.migrations.path);
        resolve(&mut self.seeds.path);
        for path in &mut self.migrations.vendor_paths {
            resolve(path);
        }
    }
}
