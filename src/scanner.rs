//! Migration discovery.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::{MigrateError, MigrateResult};
use crate::naming;
use crate::source::MigrationSource;
use crate::state::MigrationFile;

/// List every migration file in `source`, sorted ascending by version.
///
/// Files that do not follow the naming scheme are ignored. Two files with the
/// same version abort discovery; no partial list is returned.
pub fn scan(source: &dyn MigrationSource) -> MigrateResult<Vec<MigrationFile>> {
    let mut by_version: BTreeMap<i64, MigrationFile> = BTreeMap::new();

    for path in source.list()? {
        let Some(parsed) = naming::parse_path(&path)? else {
            tracing::debug!("Skipping non-migration file {}", path);
            continue;
        };

        match by_version.entry(parsed.version) {
            Entry::Occupied(existing) => {
                return Err(MigrateError::DuplicateVersion {
                    version: parsed.version,
                    first: existing.get().path.clone(),
                    second: path,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(MigrationFile::new(parsed.version, parsed.name, path));
            }
        }
    }

    tracing::debug!(
        "Discovered {} migrations in {}",
        by_version.len(),
        source.describe()
    );
    Ok(by_version.into_values().collect())
}
