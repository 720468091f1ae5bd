//! Dialect adapters: the bookkeeping SQL for each database family.
//!
//! A [`Dialect`] is an immutable value handed to the migrator at
//! construction. Presets cover PostgreSQL, MySQL, SQLite and SQL Server; a
//! fully custom set of templates can be supplied with [`Dialect::custom`].

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{MigrateError, MigrateResult};
use crate::executor::SqlValue;
use crate::state::BookkeepingRecord;

/// Default name of the bookkeeping table.
pub const DEFAULT_TABLE: &str = "migrations";

/// Timestamps are bound as text in this format and cast by the templates.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Supported database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    MySql,
    Sqlite,
    MsSql,
}

impl DialectKind {
    /// Guess the family from a connection URL scheme.
    pub fn from_url(url: &str) -> MigrateResult<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            "sqlserver" | "mssql" => Ok(Self::MsSql),
            other => Err(MigrateError::Config(format!(
                "Cannot infer SQL dialect from URL scheme '{}'",
                other
            ))),
        }
    }
}

impl FromStr for DialectKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            other => Err(MigrateError::Config(format!("Unknown dialect '{}'", other))),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::MsSql => "mssql",
        };
        f.write_str(s)
    }
}

/// The five bookkeeping queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplates {
    /// Zero params, one boolean-ish value (true/false or 1/0).
    pub check_table_exists: String,
    pub create_table: String,
    /// Two params: version, installed-at timestamp.
    pub insert_migration: String,
    /// One param: version.
    pub delete_migration: String,
    /// Zero params, zero or one row holding the highest version.
    pub select_installed_version: String,
}

/// Immutable dialect configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    name: String,
    table: String,
    queries: QueryTemplates,
}

impl Dialect {
    /// Preset for `kind`, keeping bookkeeping rows in `table`.
    pub fn new(kind: DialectKind, table: &str) -> MigrateResult<Self> {
        validate_table_name(table)?;
        Ok(Self {
            name: kind.to_string(),
            table: table.to_string(),
            queries: templates(kind, table),
        })
    }

    pub fn postgres() -> Self {
        Self::preset(DialectKind::Postgres)
    }

    pub fn mysql() -> Self {
        Self::preset(DialectKind::MySql)
    }

    pub fn sqlite() -> Self {
        Self::preset(DialectKind::Sqlite)
    }

    /// SQL Server templates. [`AnyExecutor`](crate::engine::AnyExecutor) has no
    /// driver for it, so pair this with your own `SqlExecutor`.
    pub fn mssql() -> Self {
        Self::preset(DialectKind::MsSql)
    }

    /// Hand-written templates for a database the presets don't cover.
    pub fn custom(name: impl Into<String>, table: impl Into<String>, queries: QueryTemplates) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            queries,
        }
    }

    fn preset(kind: DialectKind) -> Self {
        Self {
            name: kind.to_string(),
            table: DEFAULT_TABLE.to_string(),
            queries: templates(kind, DEFAULT_TABLE),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn queries(&self) -> &QueryTemplates {
        &self.queries
    }

    /// Parameters for [`QueryTemplates::insert_migration`].
    pub fn insert_params(&self, record: &BookkeepingRecord) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(record.version),
            SqlValue::Text(record.installed_at.format(TIMESTAMP_FORMAT).to_string()),
        ]
    }

    /// Parameters for [`QueryTemplates::delete_migration`].
    pub fn delete_params(&self, version: i64) -> Vec<SqlValue> {
        vec![SqlValue::Int(version)]
    }
}

fn templates(kind: DialectKind, t: &str) -> QueryTemplates {
    match kind {
        DialectKind::Postgres => QueryTemplates {
            check_table_exists: format!(
                "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = '{}')",
                t
            ),
            create_table: format!(
                "CREATE TABLE {} (version INT NOT NULL, installed_at TIMESTAMP NOT NULL)",
                t
            ),
            insert_migration: format!(
                "INSERT INTO {} (version, installed_at) VALUES ($1, CAST($2 AS TIMESTAMP))",
                t
            ),
            delete_migration: format!("DELETE FROM {} WHERE version = $1", t),
            select_installed_version: format!(
                "SELECT version FROM {} ORDER BY version DESC LIMIT 1",
                t
            ),
        },
        DialectKind::MySql => QueryTemplates {
            check_table_exists: format!(
                "SELECT EXISTS (SELECT * FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = '{}')",
                t
            ),
            create_table: format!(
                "CREATE TABLE {} (version INT NOT NULL, installed_at TIMESTAMP(6) NOT NULL)",
                t
            ),
            insert_migration: format!(
                "INSERT INTO {} (version, installed_at) VALUES (?, CAST(? AS DATETIME(6)))",
                t
            ),
            delete_migration: format!("DELETE FROM {} WHERE version = ?", t),
            select_installed_version: format!(
                "SELECT version FROM {} ORDER BY version DESC LIMIT 1",
                t
            ),
        },
        DialectKind::Sqlite => QueryTemplates {
            check_table_exists: format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '{}'",
                t
            ),
            create_table: format!(
                "CREATE TABLE {} (version INT NOT NULL, installed_at TIMESTAMP NOT NULL)",
                t
            ),
            insert_migration: format!(
                "INSERT INTO {} (version, installed_at) VALUES (?, ?)",
                t
            ),
            delete_migration: format!("DELETE FROM {} WHERE version = ?", t),
            select_installed_version: format!(
                "SELECT version FROM {} ORDER BY version DESC LIMIT 1",
                t
            ),
        },
        DialectKind::MsSql => QueryTemplates {
            check_table_exists: format!(
                "SELECT CASE WHEN EXISTS (SELECT * FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = '{}') THEN 1 ELSE 0 END",
                t
            ),
            create_table: format!(
                "CREATE TABLE {} (version INT NOT NULL, installed_at DATETIME2 NOT NULL)",
                t
            ),
            insert_migration: format!(
                "INSERT INTO {} (version, installed_at) VALUES (@p1, CAST(@p2 AS DATETIME2))",
                t
            ),
            delete_migration: format!("DELETE FROM {} WHERE version = @p1", t),
            select_installed_version: format!(
                "SELECT TOP 1 version FROM {} ORDER BY version DESC",
                t
            ),
        },
    }
}

fn validate_table_name(table: &str) -> MigrateResult<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !table.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(MigrateError::Config(format!(
            "Invalid bookkeeping table name '{}'",
            table
        )))
    }
}
