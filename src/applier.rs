//! Transactional apply.
//!
//! Every migration gets its own transaction holding both its SQL and the
//! matching bookkeeping change. There is no transaction spanning a batch:
//! when migration K fails, everything before K stays committed and nothing
//! after K is attempted.

use std::time::{Duration, Instant};

use chrono::Utc;

use crate::dialect::Dialect;
use crate::error::{ApplyStage, BoxError, MigrateError, MigrateResult, Section};
use crate::executor::{SqlExecutor, SqlValue};
use crate::state::{BookkeepingRecord, MigrationFile};

/// Direction of a migration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Outcome of a successful `up` or `down`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub direction: Direction,
    pub installed_before: i64,
    pub installed_after: i64,
    /// Versions applied (up) or reverted (down), in execution order.
    pub versions: Vec<i64>,
    pub elapsed: Duration,
}

impl MigrationReport {
    /// Nothing to do.
    pub fn unchanged(direction: Direction, installed: i64) -> Self {
        Self {
            direction,
            installed_before: installed,
            installed_after: installed,
            versions: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Apply `migrations` in ascending order, one transaction each.
///
/// Returns the versions that were committed. Stops at the first failure.
pub async fn apply_up(
    db: &dyn SqlExecutor,
    dialect: &Dialect,
    migrations: &[MigrationFile],
) -> MigrateResult<Vec<i64>> {
    let mut ordered: Vec<&MigrationFile> = migrations.iter().collect();
    ordered.sort_by_key(|m| m.version);

    let mut applied = Vec::with_capacity(ordered.len());
    for migration in ordered {
        let started = Instant::now();
        tracing::info!("Applying migration {} ({})...", migration.version, migration.name);

        let up = body(migration, Section::Up)?;
        let record = BookkeepingRecord {
            version: migration.version,
            installed_at: Utc::now(),
        };
        let insert = &dialect.queries().insert_migration;
        let params = dialect.insert_params(&record);

        if let Err(e) = run_step(db, migration.version, up, insert, &params).await {
            if !applied.is_empty() {
                tracing::warn!("Migrations {:?} were committed before the failure", applied);
            }
            return Err(e);
        }

        tracing::info!(
            "Applied migration {} in {:?}",
            migration.version,
            started.elapsed()
        );
        applied.push(migration.version);
    }
    Ok(applied)
}

/// Revert a single migration: run its down SQL and delete its bookkeeping row.
pub async fn apply_down(
    db: &dyn SqlExecutor,
    dialect: &Dialect,
    migration: &MigrationFile,
) -> MigrateResult<()> {
    tracing::info!("Reverting migration {} ({})...", migration.version, migration.name);

    let down = body(migration, Section::Down)?;
    let delete = &dialect.queries().delete_migration;
    let params = dialect.delete_params(migration.version);

    run_step(db, migration.version, down, delete, &params).await?;

    tracing::info!("Reverted migration {}", migration.version);
    Ok(())
}

fn body(migration: &MigrationFile, section: Section) -> MigrateResult<&str> {
    let contents = migration
        .contents
        .as_ref()
        .ok_or_else(|| MigrateError::MissingSection {
            path: migration.path.clone(),
            section,
        })?;
    Ok(match section {
        Section::Up => &contents.up,
        Section::Down => &contents.down,
    })
}

/// One transaction: the migration script, then its bookkeeping statement.
///
/// Any failure after `BEGIN` rolls the transaction back.
async fn run_step(
    db: &dyn SqlExecutor,
    version: i64,
    script: &str,
    bookkeeping: &str,
    params: &[SqlValue],
) -> MigrateResult<()> {
    let mut tx = db
        .begin()
        .await
        .map_err(|e| MigrateError::apply(version, ApplyStage::Begin, e))?;

    let steps = async {
        tx.execute_script(script)
            .await
            .map_err(|e| (ApplyStage::Execute, e))?;
        tx.execute(bookkeeping, params)
            .await
            .map_err(|e| (ApplyStage::Record, e))?;
        Ok::<(), (ApplyStage, BoxError)>(())
    }
    .await;

    if let Err((stage, source)) = steps {
        if let Err(rollback_err) = tx.rollback().await {
            tracing::warn!("Rollback of migration {} failed: {}", version, rollback_err);
        }
        return Err(MigrateError::apply(version, stage, source));
    }

    tx.commit()
        .await
        .map_err(|e| MigrateError::apply(version, ApplyStage::Commit, e))
}
