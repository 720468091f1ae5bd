//! Error types for dbmigrator.

use std::fmt;

use thiserror::Error;

/// Boxed error produced by a [`SqlExecutor`](crate::executor::SqlExecutor) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which marked section of a migration file an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Up,
    Down,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Up => write!(f, "-- +up"),
            Section::Down => write!(f, "-- +down"),
        }
    }
}

/// Step of a single migration's transaction that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStage {
    Begin,
    Execute,
    Record,
    Commit,
}

impl fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyStage::Begin => "beginning transaction",
            ApplyStage::Execute => "executing migration SQL",
            ApplyStage::Record => "updating bookkeeping table",
            ApplyStage::Commit => "committing transaction",
        };
        f.write_str(s)
    }
}

/// Bookkeeping query that failed outside of a migration transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookkeepingStage {
    CheckTable,
    CreateTable,
    ReadVersion,
}

impl fmt::Display for BookkeepingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookkeepingStage::CheckTable => "checking for migrations table",
            BookkeepingStage::CreateTable => "creating migrations table",
            BookkeepingStage::ReadVersion => "reading installed version",
        };
        f.write_str(s)
    }
}

/// Coarse category of a [`MigrateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Discovery,
    Parse,
    Consistency,
    Apply,
    Precondition,
    Config,
    Connection,
}

/// The main error type for migration operations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Reading the migration tree or a migration file failed.
    #[error("IO error at '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Two files encode the same version.
    #[error("Duplicate migration version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        version: i64,
        first: String,
        second: String,
    },

    /// A file name looked like a migration but could not be parsed.
    #[error("Invalid migration file name '{name}': {message}")]
    InvalidFileName { name: String, message: String },

    /// A section marker appears more than once.
    #[error("Duplicate `{section}` section in migration '{path}'")]
    DuplicateSection { path: String, section: Section },

    /// A required section marker is absent.
    #[error("Missing `{section}` section in migration '{path}'")]
    MissingSection { path: String, section: Section },

    /// The database is ahead of the migration files.
    #[error(
        "Installed migration version ({installed}) is higher than highest available migration ({available})"
    )]
    SchemaAhead { installed: i64, available: i64 },

    /// The installed version has no matching migration file.
    #[error("Failed to find currently installed migration {version}")]
    InstalledNotFound { version: i64 },

    /// Down was requested on a database with nothing installed.
    #[error("No migrations to revert")]
    NothingToRevert,

    /// A migration's transaction failed and was rolled back.
    #[error("Error {stage} for migration {version}: {source}")]
    Apply {
        version: i64,
        stage: ApplyStage,
        #[source]
        source: BoxError,
    },

    /// A bookkeeping query failed.
    #[error("Error {stage}: {source}")]
    Bookkeeping {
        stage: BookkeepingStage,
        #[source]
        source: BoxError,
    },

    /// Could not reach the database.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Several content-load tasks failed.
    #[error("{} migration files failed to load; first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Multiple(Vec<MigrateError>),
}

impl MigrateError {
    /// Create an IO error for the given path.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an apply error for a migration.
    pub fn apply(version: i64, stage: ApplyStage, source: impl Into<BoxError>) -> Self {
        Self::Apply {
            version,
            stage,
            source: source.into(),
        }
    }

    /// Create a bookkeeping error.
    pub fn bookkeeping(stage: BookkeepingStage, source: impl Into<BoxError>) -> Self {
        Self::Bookkeeping {
            stage,
            source: source.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::DuplicateVersion { .. } | Self::InvalidFileName { .. } => {
                ErrorKind::Discovery
            }
            Self::DuplicateSection { .. } | Self::MissingSection { .. } => ErrorKind::Parse,
            Self::SchemaAhead { .. } | Self::InstalledNotFound { .. } => ErrorKind::Consistency,
            Self::Apply { .. } | Self::Bookkeeping { .. } => ErrorKind::Apply,
            Self::NothingToRevert => ErrorKind::Precondition,
            Self::Config(_) => ErrorKind::Config,
            Self::Connection(_) => ErrorKind::Connection,
            Self::Multiple(errors) => errors
                .first()
                .map(MigrateError::kind)
                .unwrap_or(ErrorKind::Parse),
        }
    }
}

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;
