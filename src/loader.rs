//! Parallel loading of migration contents.
//!
//! Each pending migration is read and parsed on its own blocking task. All
//! tasks are awaited before anything is applied; results come back sorted by
//! version no matter which task finished first.

use std::sync::Arc;

use serde::Deserialize;
use tokio::task::JoinSet;

use crate::error::{MigrateError, MigrateResult};
use crate::parser::parse_contents;
use crate::source::MigrationSource;
use crate::state::MigrationFile;

/// How load failures are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Return the first failure to complete.
    #[default]
    FailFast,
    /// Return every failure, wrapped in [`MigrateError::Multiple`] when there is more than one.
    CollectAll,
}

/// Fill `contents` for every migration in `migrations`.
pub async fn load_contents(
    source: Arc<dyn MigrationSource>,
    migrations: Vec<MigrationFile>,
    policy: LoadPolicy,
) -> MigrateResult<Vec<MigrationFile>> {
    let total = migrations.len();
    let mut tasks = JoinSet::new();

    for mut migration in migrations {
        let source = Arc::clone(&source);
        tasks.spawn_blocking(move || {
            let text = source.read(&migration.path)?;
            migration.contents = Some(parse_contents(&migration.path, &text)?);
            Ok::<_, MigrateError>(migration)
        });
    }

    let mut loaded = Vec::with_capacity(total);
    let mut errors = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(migration)) => {
                tracing::debug!("Loaded migration {} from {}", migration.version, migration.path);
                loaded.push(migration);
            }
            Ok(Err(e)) => errors.push(e),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => errors.push(MigrateError::io("load task", std::io::Error::other(e))),
        }
    }

    if !errors.is_empty() {
        return Err(match policy {
            LoadPolicy::FailFast => errors.swap_remove(0),
            LoadPolicy::CollectAll if errors.len() == 1 => errors.swap_remove(0),
            LoadPolicy::CollectAll => MigrateError::Multiple(errors),
        });
    }

    loaded.sort_by_key(|m| m.version);
    Ok(loaded)
}

/// Fill `contents` for a single migration.
pub async fn load_one(
    source: Arc<dyn MigrationSource>,
    migration: MigrationFile,
) -> MigrateResult<MigrationFile> {
    let mut loaded = load_contents(source, vec![migration], LoadPolicy::FailFast).await?;
    loaded
        .pop()
        .ok_or_else(|| MigrateError::Config("load task returned no migration".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::scan;
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;

    fn body(n: i64) -> String {
        format!("-- +up\nCREATE TABLE t{n} (id INT);\n-- +down\nDROP TABLE t{n};\n")
    }

    #[tokio::test]
    async fn test_loads_all_in_version_order() {
        let source = MemorySource::new()
            .with_file("0003_c.sql", body(3))
            .with_file("0001_a.sql", body(1))
            .with_file("0002_b.sql", body(2));
        let files = scan(&source).unwrap();
        let loaded = load_contents(Arc::new(source), files, LoadPolicy::FailFast)
            .await
            .unwrap();

        let versions: Vec<i64> = loaded.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(
            loaded[1].contents.as_ref().unwrap().up,
            "CREATE TABLE t2 (id INT);\n"
        );
    }

    #[tokio::test]
    async fn test_fail_fast_returns_single_error() {
        let source = MemorySource::new()
            .with_file("0001_a.sql", body(1))
            .with_file("0002_b.sql", "-- +up\nSELECT 1;\n")
            .with_file("0003_c.sql", "-- +down\nSELECT 1;\n");
        let files = scan(&source).unwrap();
        let err = load_contents(Arc::new(source), files, LoadPolicy::FailFast)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::MissingSection { .. }));
    }

    #[tokio::test]
    async fn test_collect_all_returns_every_error() {
        let source = MemorySource::new()
            .with_file("0001_a.sql", body(1))
            .with_file("0002_b.sql", "-- +up\nSELECT 1;\n")
            .with_file("0003_c.sql", "-- +down\nSELECT 1;\n");
        let files = scan(&source).unwrap();
        let err = load_contents(Arc::new(source), files, LoadPolicy::CollectAll)
            .await
            .unwrap_err();
        match err {
            MigrateError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_one_missing_file() {
        let source = MemorySource::new();
        let err = load_one(Arc::new(source), MigrationFile::new(1, "gone", "0001_gone.sql"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Io { .. }));
    }
}
