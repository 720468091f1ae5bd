//! Migration data model and state reconciliation.

use chrono::{DateTime, Utc};

use crate::error::{MigrateError, MigrateResult};
use crate::parser::MigrationContents;

/// One migration file found by the scanner.
///
/// `contents` stays `None` until the loader fills it for the migrations an
/// operation actually needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub version: i64,
    pub name: String,
    pub path: String,
    pub contents: Option<MigrationContents>,
}

impl MigrationFile {
    pub fn new(version: i64, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            path: path.into(),
            contents: None,
        }
    }
}

/// A row of the bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookkeepingRecord {
    pub version: i64,
    pub installed_at: DateTime<Utc>,
}

/// How the installed version relates to the available one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    UpToDate,
    Behind,
    /// Schema ahead of code.
    Inconsistent,
}

/// Snapshot of available versus installed migrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    pub available_version: i64,
    pub installed_version: i64,
    /// Sorted ascending by version.
    pub migrations: Vec<MigrationFile>,
}

impl MigrationState {
    /// Join scanner output with the installed version.
    pub fn reconcile(migrations: Vec<MigrationFile>, installed_version: i64) -> Self {
        if migrations.is_empty() {
            tracing::warn!("No database migrations found");
        }
        let available_version = migrations.last().map(|m| m.version).unwrap_or(0);
        Self {
            available_version,
            installed_version,
            migrations,
        }
    }

    pub fn relation(&self) -> Relation {
        use std::cmp::Ordering;
        match self.installed_version.cmp(&self.available_version) {
            Ordering::Equal => Relation::UpToDate,
            Ordering::Less => Relation::Behind,
            Ordering::Greater => Relation::Inconsistent,
        }
    }

    /// Fails when the database is ahead of the migration files.
    pub fn ensure_consistent(&self) -> MigrateResult<()> {
        if self.relation() == Relation::Inconsistent {
            return Err(MigrateError::SchemaAhead {
                installed: self.installed_version,
                available: self.available_version,
            });
        }
        Ok(())
    }

    /// Migrations newer than the installed version, ascending.
    pub fn pending(&self) -> impl Iterator<Item = &MigrationFile> {
        self.migrations
            .iter()
            .filter(move |m| m.version > self.installed_version)
    }

    /// Consume the state, keeping only the pending migrations.
    pub fn into_pending(self) -> Vec<MigrationFile> {
        let installed = self.installed_version;
        self.migrations
            .into_iter()
            .filter(|m| m.version > installed)
            .collect()
    }

    /// Consume the state, returning the migration that is currently installed.
    pub fn into_installed(self) -> MigrateResult<MigrationFile> {
        if self.installed_version == 0 {
            return Err(MigrateError::NothingToRevert);
        }
        let installed = self.installed_version;
        self.migrations
            .into_iter()
            .find(|m| m.version == installed)
            .ok_or(MigrateError::InstalledNotFound { version: installed })
    }
}
