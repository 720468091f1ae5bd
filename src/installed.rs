//! Installed-version lookup.

use crate::dialect::Dialect;
use crate::error::{BookkeepingStage, MigrateError, MigrateResult};
use crate::executor::SqlExecutor;

/// Create the bookkeeping table if it is missing.
///
/// The existence check and the create are separate statements; two
/// migrators racing here can both attempt the create.
pub async fn ensure_table(db: &dyn SqlExecutor, dialect: &Dialect) -> MigrateResult<()> {
    let queries = dialect.queries();

    let exists = db
        .fetch_flag(&queries.check_table_exists)
        .await
        .map_err(|e| MigrateError::bookkeeping(BookkeepingStage::CheckTable, e))?;

    if !exists {
        tracing::info!("Creating bookkeeping table {}", dialect.table());
        db.execute(&queries.create_table)
            .await
            .map_err(|e| MigrateError::bookkeeping(BookkeepingStage::CreateTable, e))?;
    }
    Ok(())
}

/// Highest installed version, `0` on a fresh database.
pub async fn installed_version(db: &dyn SqlExecutor, dialect: &Dialect) -> MigrateResult<i64> {
    ensure_table(db, dialect).await?;

    let version = db
        .fetch_optional_int(&dialect.queries().select_installed_version)
        .await
        .map_err(|e| MigrateError::bookkeeping(BookkeepingStage::ReadVersion, e))?;

    Ok(version.unwrap_or(0))
}
