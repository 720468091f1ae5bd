//! Migration content parser.
//!
//! A migration file carries its forward and backward SQL under two marker
//! lines:
//!
//! ```text
//! -- +up
//! CREATE TABLE users (id INT NOT NULL);
//! -- +down
//! DROP TABLE users;
//! ```
//!
//! Markers are case-insensitive, may be indented, and may carry trailing
//! text on the same line. Everything between a marker and the next marker
//! (or end of file) belongs to that section; lines before the first marker
//! are dropped. SQL is passed through untouched.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{space0, space1},
    combinator::{eof, value},
    sequence::{preceded, terminated, tuple},
};

use crate::error::{MigrateError, MigrateResult, Section};

/// Forward and backward SQL bodies of one migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationContents {
    pub up: String,
    pub down: String,
}

/// Split `content` into its up and down sections.
///
/// `path` is only used to name the file in errors.
pub fn parse_contents(path: &str, content: &str) -> MigrateResult<MigrationContents> {
    let mut up: Option<String> = None;
    let mut down: Option<String> = None;
    let mut current: Option<Section> = None;
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    for line in content.lines() {
        if let Some(section) = marker(line) {
            let slot = match section {
                Section::Up => &mut up,
                Section::Down => &mut down,
            };
            if slot.is_some() {
                return Err(MigrateError::DuplicateSection {
                    path: path.to_string(),
                    section,
                });
            }
            tracing::debug!("Found {} marker in {}", section, path);
            *slot = Some(String::new());
            current = Some(section);
            continue;
        }

        let body = match current {
            Some(Section::Up) => up.as_mut(),
            Some(Section::Down) => down.as_mut(),
            None => None,
        };
        if let Some(body) = body {
            body.push_str(line);
            body.push('\n');
        }
    }

    let up = up.ok_or_else(|| MigrateError::MissingSection {
        path: path.to_string(),
        section: Section::Up,
    })?;
    let down = down.ok_or_else(|| MigrateError::MissingSection {
        path: path.to_string(),
        section: Section::Down,
    })?;

    Ok(MigrationContents { up, down })
}

/// Recognize a marker line, returning which section it opens.
pub fn marker(line: &str) -> Option<Section> {
    parse_marker(line).ok().map(|(_, section)| section)
}

/// `-- +up [ignored text]` / `-- +down [ignored text]`
fn parse_marker(input: &str) -> IResult<&str, Section> {
    let (input, _) = tuple((space0, tag("--"), space0))(input)?;
    terminated(
        alt((
            value(Section::Down, tag_no_case("+down")),
            value(Section::Up, tag_no_case("+up")),
        )),
        alt((eof, preceded(space1, rest_of_line))),
    )(input)
}

fn rest_of_line(input: &str) -> IResult<&str, &str> {
    Ok(("", input))
}
