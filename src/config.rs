//! Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which data store backs the fleet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Local SQLite file (default)
    #[default]
    Sqlite,
    /// In-process tables, gone on exit
    Memory,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".yacht-maint/fleet.db")
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset, e.g. "info" or
    /// "yacht_maintenance=debug".
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG: &str = "yacht-maint.yaml";

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config files, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("yacht-maint").join("config.yaml"));
        }
        paths
    }

    /// Load configuration from default locations or return defaults, then
    /// apply environment overrides.
    ///
    /// Logging is not up yet at this point, so problems are returned as
    /// warnings for the caller to log.
    pub fn load_or_default() -> (Self, Vec<String>) {
        let (mut config, mut warnings) = Self::load_first(&Self::search_paths());
        warnings.extend(config.apply_overrides(|key| std::env::var(key).ok()));
        (config, warnings)
    }

    /// Load the first readable file among `paths`, or defaults.
    pub fn load_first(paths: &[PathBuf]) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let config = paths
            .iter()
            .filter(|p| p.is_file())
            .find_map(|p| match Self::load(p) {
                Ok(config) => Some(config),
                Err(e) => {
                    warnings.push(format!("Ignoring unreadable config {}: {:#}", p.display(), e));
                    None
                }
            })
            .unwrap_or_default();
        (config, warnings)
    }

    /// Apply `YACHT_MAINT_*` overrides read through `get`. Returns a warning
    /// for each override that was ignored.
    pub fn apply_overrides<F>(&mut self, get: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        if let Some(db_path) = get("YACHT_MAINT_DB_PATH") {
            self.store.db_path = PathBuf::from(db_path);
        }

        if let Some(backend) = get("YACHT_MAINT_BACKEND") {
            match backend.parse() {
                Ok(backend) => self.store.backend = backend,
                Err(e) => warnings.push(format!("Ignoring YACHT_MAINT_BACKEND: {}", e)),
            }
        }

        if let Some(level) = get("YACHT_MAINT_LOG_LEVEL") {
            self.logging.level = level;
        }
        warnings
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.store.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        Ok(())
    }
}
