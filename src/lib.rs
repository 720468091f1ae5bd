//! # dbmigrator
//!
//! Versioned SQL migrations for PostgreSQL, MySQL and SQLite.
//!
//! Migrations are plain files named `NNNN_name.sql` holding an up and a down
//! section:
//!
//! ```sql
//! -- +up
//! CREATE TABLE users (id INT PRIMARY KEY);
//!
//! -- +down
//! DROP TABLE users;
//! ```
//!
//! The migrator compares the highest file version with the highest version
//! recorded in the bookkeeping table, then applies every pending migration
//! (or reverts the latest one) with one transaction per migration.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use dbmigrator::prelude::*;
//!
//! let migrator = dbmigrator::connect("sqlite://app.db", "migrations").await?;
//! let report = migrator.up().await?;
//! println!("now at version {}", report.installed_after);
//! ```

pub mod applier;
pub mod command;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod executor;
pub mod installed;
pub mod loader;
pub mod migrator;
pub mod naming;
pub mod parser;
pub mod scanner;
pub mod source;
pub mod state;

#[cfg(test)]
mod mock;

use std::path::PathBuf;

pub mod prelude {
    pub use crate::applier::{Direction, MigrationReport};
    pub use crate::command::{Command, handle_command, help_text};
    pub use crate::config::MigratorConfig;
    pub use crate::dialect::{Dialect, DialectKind, QueryTemplates};
    pub use crate::engine::AnyExecutor;
    pub use crate::error::*;
    pub use crate::executor::{SqlExecutor, SqlTransaction, SqlValue};
    pub use crate::loader::LoadPolicy;
    pub use crate::migrator::{Migrator, create_migration};
    pub use crate::source::{DirSource, EmbeddedSource, MemorySource, MigrationSource};
    pub use crate::state::{MigrationFile, MigrationState, Relation};
}

use crate::config::MigratorConfig;
use crate::dialect::{DEFAULT_TABLE, Dialect, DialectKind};
use crate::engine::AnyExecutor;
use crate::error::{MigrateError, MigrateResult};
use crate::migrator::Migrator;
use crate::source::DirSource;

/// Connect to `url` and read migrations from the directory `dir`.
///
/// The dialect is picked from the URL scheme and the bookkeeping table is
/// `migrations`.
pub async fn connect(url: &str, dir: impl Into<PathBuf>) -> MigrateResult<Migrator> {
    let kind = DialectKind::from_url(url)?;
    ensure_sqlx_driver(kind)?;
    let dialect = Dialect::new(kind, DEFAULT_TABLE)?;
    let db = AnyExecutor::connect(url).await?;
    Ok(Migrator::new(db, DirSource::new(dir), dialect))
}

/// Build a migrator from a resolved [`MigratorConfig`].
pub async fn from_config(config: &MigratorConfig) -> MigrateResult<Migrator> {
    ensure_sqlx_driver(config.dialect_kind()?)?;
    let dialect = config.dialect()?;
    let db = AnyExecutor::connect(config.database_url()?).await?;
    let source = DirSource::new(config.migrations.dir.clone());
    Ok(Migrator::new(db, source, dialect).with_load_policy(config.migrations.load_policy))
}

/// `AnyExecutor` only carries the postgres, mysql and sqlite drivers.
fn ensure_sqlx_driver(kind: DialectKind) -> MigrateResult<()> {
    match kind {
        DialectKind::Postgres | DialectKind::MySql | DialectKind::Sqlite => Ok(()),
        DialectKind::MsSql => Err(MigrateError::Config(format!(
            "No built-in driver for {}; build a Migrator with your own SqlExecutor",
            kind
        ))),
    }
}
