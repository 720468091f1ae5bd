//! Migration file-name grammar.
//!
//! ```text
//! 0003_add_index.sql
//! ─┬── ┬───┬───── ┬──
//!  │   │   │      └── Extension (always `.sql`)
//!  │   │   └── Name (no whitespace)
//!  │   └── Separator
//!  └── Version (4 or more digits)
//! ```
//!
//! Only the final path component is inspected, so the same rules apply to
//! `/` and `\` separated trees alike.

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{all_consuming, verify},
    sequence::separated_pair,
};

use crate::error::{MigrateError, MigrateResult};

/// Minimum number of digits in a version prefix.
pub const MIN_VERSION_DIGITS: usize = 4;

/// Extension every migration file carries.
pub const EXTENSION: &str = ".sql";

/// A file name that follows the migration naming scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationName {
    pub version: i64,
    pub name: String,
}

/// Parse a bare file name (no directories).
///
/// Returns `Ok(None)` when the name is simply not a migration file, and an
/// error only when it is shaped like one but its version cannot be represented.
pub fn parse_file_name(file_name: &str) -> MigrateResult<Option<MigrationName>> {
    let Some(stem) = file_name.strip_suffix(EXTENSION) else {
        return Ok(None);
    };

    let (digits, name) = match all_consuming(version_and_name)(stem) {
        Ok((_, parts)) => parts,
        Err(_) => return Ok(None),
    };

    let version = digits
        .parse::<i64>()
        .map_err(|e| MigrateError::InvalidFileName {
            name: file_name.to_string(),
            message: format!("version '{}' is not a valid integer: {}", digits, e),
        })?;

    Ok(Some(MigrationName {
        version,
        name: name.to_string(),
    }))
}

/// Parse the last component of a `/` or `\` separated path.
pub fn parse_path(path: &str) -> MigrateResult<Option<MigrationName>> {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    parse_file_name(file_name)
}

/// Build a file name for a new migration, zero padding the version.
pub fn format_file_name(version: i64, name: &str) -> MigrateResult<String> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(MigrateError::InvalidFileName {
            name: name.to_string(),
            message: "migration name must be non-empty and contain no whitespace".to_string(),
        });
    }
    if version < 0 {
        return Err(MigrateError::InvalidFileName {
            name: name.to_string(),
            message: format!("version {} is negative", version),
        });
    }
    Ok(format!(
        "{:0width$}_{}{}",
        version,
        name,
        EXTENSION,
        width = MIN_VERSION_DIGITS
    ))
}

/// `NNNN_name`
fn version_and_name(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(version_digits, char('_'), migration_label)(input)
}

fn version_digits(input: &str) -> IResult<&str, &str> {
    verify(digit1, |d: &str| d.len() >= MIN_VERSION_DIGITS)(input)
}

fn migration_label(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}
