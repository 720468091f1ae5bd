//! The migrator: reconcile, load, apply.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinError;

use crate::applier::{self, Direction, MigrationReport};
use crate::dialect::Dialect;
use crate::error::{MigrateError, MigrateResult};
use crate::executor::SqlExecutor;
use crate::installed;
use crate::loader::{self, LoadPolicy};
use crate::naming;
use crate::scanner;
use crate::source::{DirSource, MigrationSource};
use crate::state::{MigrationState, Relation};

/// Reconciles a database against a migration source and moves it one step.
///
/// State is recomputed on every call; nothing is cached between calls.
/// Running two migrators against the same database at once is not
/// supported: the table check and the installed-version read are not
/// serialized between processes.
#[derive(Clone)]
pub struct Migrator {
    db: Arc<dyn SqlExecutor>,
    source: Arc<dyn MigrationSource>,
    dialect: Dialect,
    load_policy: LoadPolicy,
}

impl Migrator {
    pub fn new(db: impl SqlExecutor, source: impl MigrationSource, dialect: Dialect) -> Self {
        Self::from_shared(Arc::new(db), Arc::new(source), dialect)
    }

    /// Build from handles that are already shared with the host.
    pub fn from_shared(
        db: Arc<dyn SqlExecutor>,
        source: Arc<dyn MigrationSource>,
        dialect: Dialect,
    ) -> Self {
        Self {
            db,
            source,
            dialect,
            load_policy: LoadPolicy::default(),
        }
    }

    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Scan the source and read the installed version concurrently.
    pub async fn status(&self) -> MigrateResult<MigrationState> {
        tracing::debug!("Getting migration info...");

        let source = Arc::clone(&self.source);
        let scan = tokio::task::spawn_blocking(move || scanner::scan(source.as_ref()));

        let db = Arc::clone(&self.db);
        let dialect = self.dialect.clone();
        let installed =
            tokio::spawn(async move { installed::installed_version(db.as_ref(), &dialect).await });

        let (scanned, installed) = tokio::join!(scan, installed);
        let migrations = joined(scanned)?;
        let installed = joined(installed)?;

        Ok(MigrationState::reconcile(migrations, installed))
    }

    /// Apply every pending migration.
    pub async fn up(&self) -> MigrateResult<MigrationReport> {
        let started = Instant::now();
        let state = self.status().await?;

        match state.relation() {
            Relation::UpToDate => {
                tracing::info!("Already up to date at version {}", state.installed_version);
                return Ok(MigrationReport::unchanged(
                    Direction::Up,
                    state.installed_version,
                ));
            }
            Relation::Inconsistent => {
                return Err(MigrateError::SchemaAhead {
                    installed: state.installed_version,
                    available: state.available_version,
                });
            }
            Relation::Behind => {
                tracing::info!(
                    "Migrating from {} to {}...",
                    state.installed_version,
                    state.available_version
                );
            }
        }

        let installed_before = state.installed_version;
        let pending = state.into_pending();
        let loaded =
            loader::load_contents(Arc::clone(&self.source), pending, self.load_policy).await?;

        let versions = applier::apply_up(self.db.as_ref(), &self.dialect, &loaded).await?;
        tracing::info!("Migration complete.");

        Ok(MigrationReport {
            direction: Direction::Up,
            installed_before,
            installed_after: versions.last().copied().unwrap_or(installed_before),
            versions,
            elapsed: started.elapsed(),
        })
    }

    /// Revert the currently installed migration, and only that one.
    pub async fn down(&self) -> MigrateResult<MigrationReport> {
        let started = Instant::now();
        let state = self.status().await?;
        let installed_before = state.installed_version;
        let previous = state
            .migrations
            .iter()
            .map(|m| m.version)
            .filter(|v| *v < installed_before)
            .max()
            .unwrap_or(0);

        let migration = state.into_installed()?;
        let migration = loader::load_one(Arc::clone(&self.source), migration).await?;
        applier::apply_down(self.db.as_ref(), &self.dialect, &migration).await?;

        // The revert is already committed; report it even when the re-read fails.
        let installed_after =
            match installed::installed_version(self.db.as_ref(), &self.dialect).await {
                Ok(version) => version,
                Err(e) => {
                    tracing::warn!(
                        "Reverted migration {} but could not re-read the installed version: {}",
                        migration.version,
                        e
                    );
                    previous
                }
            };

        Ok(MigrationReport {
            direction: Direction::Down,
            installed_before,
            installed_after,
            versions: vec![migration.version],
            elapsed: started.elapsed(),
        })
    }
}

/// Write a new, empty migration into `dir`, numbered after the highest existing one.
pub fn create_migration(dir: &Path, name: &str) -> MigrateResult<PathBuf> {
    let existing = if dir.exists() {
        scanner::scan(&DirSource::new(dir))?
    } else {
        std::fs::create_dir_all(dir).map_err(|e| MigrateError::io(dir.display().to_string(), e))?;
        Vec::new()
    };

    let version = existing.last().map(|m| m.version + 1).unwrap_or(1);
    let file_name = naming::format_file_name(version, name)?;
    let path = dir.join(&file_name);

    let template = format!(
        "-- Migration: {}\n-- Created: {}\n\n-- +up\n\n\n-- +down\n\n",
        name,
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    std::fs::write(&path, template).map_err(|e| MigrateError::io(path.display().to_string(), e))?;

    tracing::info!("Created migration {}", path.display());
    Ok(path)
}

fn joined<T>(result: Result<MigrateResult<T>, JoinError>) -> MigrateResult<T> {
    match result {
        Ok(inner) => inner,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(MigrateError::io("reconcile task", std::io::Error::other(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::{ApplyStage, BoxError, Section};
    use crate::executor::SqlTransaction;
    use crate::mock::MockDb;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_file(
                "0001_init.sql",
                "-- +up\nCREATE TABLE users (id INT);\n-- +down\nDROP TABLE users;\n",
            )
            .with_file(
                "0002_add_col.sql",
                "-- +up\nALTER TABLE users ADD COLUMN email TEXT;\n-- +down\nALTER TABLE users DROP COLUMN email;\n",
            )
            .with_file(
                "0003_index.sql",
                "-- +up\nCREATE INDEX users_email ON users (email);\n-- +down\nDROP INDEX users_email;\n",
            )
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let db = MockDb::new();
        let migrator = Migrator::new(db.clone(), source(), Dialect::postgres());

        let report = migrator.up().await.unwrap();
        assert_eq!(report.installed_before, 0);
        assert_eq!(report.installed_after, 3);
        assert_eq!(report.versions, vec![1, 2, 3]);
        assert_eq!(db.versions(), vec![1, 2, 3]);
        assert_eq!(
            db.scripts(),
            vec![
                "CREATE TABLE users (id INT);\n",
                "ALTER TABLE users ADD COLUMN email TEXT;\n",
                "CREATE INDEX users_email ON users (email);\n",
            ]
        );

        let report = migrator.down().await.unwrap();
        assert_eq!(report.direction, Direction::Down);
        assert_eq!(report.versions, vec![3]);
        assert_eq!(report.installed_after, 2);
        assert_eq!(db.versions(), vec![1, 2]);
        assert_eq!(db.scripts().last().unwrap(), "DROP INDEX users_email;\n");
    }

    #[tokio::test]
    async fn test_up_when_current_writes_nothing() {
        let db = MockDb::with_versions(&[1, 2, 3]);
        let migrator = Migrator::new(db.clone(), source(), Dialect::postgres());

        let report = migrator.up().await.unwrap();
        assert!(report.versions.is_empty());
        assert_eq!(report.installed_after, 3);
        assert_eq!(db.commits(), 0);
        assert!(db.scripts().is_empty());
        assert!(!db.log().iter().any(|s| s == "BEGIN"));
    }

    #[tokio::test]
    async fn test_up_only_applies_pending() {
        let db = MockDb::with_versions(&[1]);
        let migrator = Migrator::new(db.clone(), source(), Dialect::postgres());
        let report = migrator.up().await.unwrap();
        assert_eq!(report.versions, vec![2, 3]);
        assert_eq!(db.versions(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_schema_ahead_touches_nothing() {
        let db = MockDb::with_versions(&[1, 2, 3, 4]);
        let migrator = Migrator::new(db.clone(), source(), Dialect::postgres());
        let err = migrator.up().await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::SchemaAhead {
                installed: 4,
                available: 3
            }
        ));
        assert_eq!(db.commits(), 0);
    }

    #[tokio::test]
    async fn test_failed_migration_is_retried_next_run() {
        let db = MockDb::with_versions(&[]).fail_on("ADD COLUMN");
        let migrator = Migrator::new(db.clone(), source(), Dialect::postgres());
        let err = migrator.up().await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Apply {
                version: 2,
                stage: ApplyStage::Execute,
                ..
            }
        ));
        assert_eq!(db.versions(), vec![1]);

        let fixed = MockDb::with_versions(&db.versions());
        let migrator = Migrator::new(fixed.clone(), source(), Dialect::postgres());
        let report = migrator.up().await.unwrap();
        assert_eq!(report.versions, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_invalid_section_fails_before_any_sql() {
        let bad = source().with_file("0004_bad.sql", "-- +up\nSELECT 1;\n-- +up\nSELECT 2;\n");
        let db = MockDb::with_versions(&[]);
        let migrator = Migrator::new(db.clone(), bad, Dialect::postgres());
        let err = migrator.up().await.unwrap_err();
        assert!(matches!(err, MigrateError::DuplicateSection { .. }));
        assert!(db.scripts().is_empty());
        assert_eq!(db.commits(), 0);
    }

    #[tokio::test]
    async fn test_missing_down_section_fails_before_any_sql() {
        let bad = source().with_file("0004_no_down.sql", "-- +up\nCREATE TABLE t (id INT);\n");
        let db = MockDb::with_versions(&[1, 2, 3]);
        let migrator = Migrator::new(db.clone(), bad, Dialect::postgres());
        let err = migrator.up().await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::MissingSection {
                section: Section::Down,
                ..
            }
        ));
        assert!(db.scripts().is_empty());
        assert_eq!(db.versions(), vec![1, 2, 3]);
    }

    /// Fails the `n`th installed-version read (zero based), delegating everything else.
    struct FailingRead {
        db: MockDb,
        reads: AtomicUsize,
        fail_at: usize,
    }

    #[async_trait]
    impl SqlExecutor for FailingRead {
        async fn fetch_flag(&self, sql: &str) -> Result<bool, BoxError> {
            self.db.fetch_flag(sql).await
        }

        async fn fetch_optional_int(&self, sql: &str) -> Result<Option<i64>, BoxError> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == self.fail_at {
                return Err("connection reset".into());
            }
            self.db.fetch_optional_int(sql).await
        }

        async fn execute(&self, sql: &str) -> Result<u64, BoxError> {
            SqlExecutor::execute(&self.db, sql).await
        }

        async fn begin(&self) -> Result<Box<dyn SqlTransaction>, BoxError> {
            self.db.begin().await
        }
    }

    #[tokio::test]
    async fn test_down_reports_success_when_reread_fails() {
        let db = MockDb::with_versions(&[1, 2, 3]);
        let flaky = FailingRead {
            db: db.clone(),
            reads: AtomicUsize::new(0),
            fail_at: 1,
        };
        let migrator = Migrator::new(flaky, source(), Dialect::postgres());

        let report = migrator.down().await.unwrap();
        assert_eq!(report.versions, vec![3]);
        assert_eq!(report.installed_after, 2);
        assert_eq!(db.versions(), vec![1, 2]);
        assert_eq!(db.commits(), 1);
    }

    #[tokio::test]
    async fn test_down_on_fresh_database() {
        let db = MockDb::new();
        let migrator = Migrator::new(db.clone(), source(), Dialect::postgres());
        assert!(matches!(
            migrator.down().await,
            Err(MigrateError::NothingToRevert)
        ));
    }

    #[tokio::test]
    async fn test_down_with_missing_file() {
        let db = MockDb::with_versions(&[1, 2, 3, 7]);
        let migrator = Migrator::new(db, source(), Dialect::postgres());
        assert!(matches!(
            migrator.down().await,
            Err(MigrateError::InstalledNotFound { version: 7 })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_versions_abort_status() {
        let dup = source().with_file("nested/0002_again.sql", "");
        let migrator = Migrator::new(MockDb::new(), dup, Dialect::postgres());
        assert!(matches!(
            migrator.status().await,
            Err(MigrateError::DuplicateVersion { version: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_source_is_up_to_date() {
        let db = MockDb::new();
        let migrator = Migrator::new(db.clone(), MemorySource::new(), Dialect::sqlite());
        let state = migrator.status().await.unwrap();
        assert_eq!(state.available_version, 0);
        assert_eq!(state.installed_version, 0);
        assert!(migrator.up().await.unwrap().versions.is_empty());
    }

    #[test]
    fn test_create_migration_numbers_after_highest() {
        let dir = tempfile::tempdir().unwrap();
        let first = create_migration(dir.path(), "init").unwrap();
        assert!(first.ends_with("0001_init.sql"));
        std::fs::write(dir.path().join("0009_manual.sql"), "").unwrap();
        let next = create_migration(dir.path(), "add_users").unwrap();
        assert!(next.ends_with("0010_add_users.sql"));

        let text = std::fs::read_to_string(&next).unwrap();
        let contents = crate::parser::parse_contents("x", &text).unwrap();
        assert_eq!(contents.up.trim(), "");
        assert!(create_migration(dir.path(), "has space").is_err());
    }
}
