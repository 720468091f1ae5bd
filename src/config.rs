//! Migrator configuration.
//!
//! Read from TOML:
//!
//! ```toml
//! [database]
//! url = "postgres://localhost/app"
//! dialect = "postgres"
//!
//! [migrations]
//! dir = "migrations"
//! table = "migrations"
//! load_policy = "fail_fast"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dialect::{DEFAULT_TABLE, Dialect, DialectKind};
use crate::error::{MigrateError, MigrateResult};
use crate::loader::LoadPolicy;

/// File looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "dbmigrator.toml";

/// Full configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    /// Detected from the URL scheme when unset.
    pub dialect: Option<DialectKind>,
}

/// `[migrations]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    pub table: String,
    pub load_policy: LoadPolicy,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            table: DEFAULT_TABLE.to_string(),
            load_policy: LoadPolicy::default(),
        }
    }
}

impl MigratorConfig {
    pub fn builder() -> MigratorConfigBuilder {
        MigratorConfigBuilder::default()
    }

    pub fn from_toml_str(text: &str) -> MigrateResult<Self> {
        toml::from_str(text).map_err(|e| MigrateError::Config(e.to_string()))
    }

    /// Load a config file that must exist.
    pub fn load(path: &Path) -> MigrateResult<Self> {
        let text =
            fs::read_to_string(path).map_err(|e| MigrateError::io(path.display().to_string(), e))?;
        Self::from_toml_str(&text).map_err(|e| match e {
            MigrateError::Config(msg) => {
                MigrateError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Load `explicit` if given, otherwise the first config file found in
    /// [`search_paths`]. Falls back to defaults when none exists.
    pub fn discover(explicit: Option<&Path>) -> MigrateResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        for path in search_paths() {
            if path.is_file() {
                tracing::debug!("Using config file {}", path.display());
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    pub fn database_url(&self) -> MigrateResult<&str> {
        self.database.url.as_deref().ok_or_else(|| {
            MigrateError::Config(
                "No database URL configured (set DATABASE_URL or [database] url)".to_string(),
            )
        })
    }

    pub fn dialect_kind(&self) -> MigrateResult<DialectKind> {
        match self.database.dialect {
            Some(kind) => Ok(kind),
            None => DialectKind::from_url(self.database_url()?),
        }
    }

    pub fn dialect(&self) -> MigrateResult<Dialect> {
        Dialect::new(self.dialect_kind()?, &self.migrations.table)
    }
}

/// Config locations in lookup order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("dbmigrator").join("config.toml"));
    }
    paths
}

/// Builder for [`MigratorConfig`]. Each setter overrides whatever the
/// starting config holds.
#[derive(Debug, Default)]
pub struct MigratorConfigBuilder {
    config: MigratorConfig,
}

impl MigratorConfigBuilder {
    /// Start from an existing config, usually one read from disk.
    pub fn from_config(config: MigratorConfig) -> Self {
        Self { config }
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database.url = Some(url.into());
        self
    }

    pub fn dialect(mut self, kind: DialectKind) -> Self {
        self.config.database.dialect = Some(kind);
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.migrations.dir = dir.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.migrations.table = table.into();
        self
    }

    pub fn load_policy(mut self, policy: LoadPolicy) -> Self {
        self.config.migrations.load_policy = policy;
        self
    }

    pub fn build(self) -> MigratorConfig {
        self.config
    }
}
