//! Where migration files come from.
//!
//! A [`MigrationSource`] exposes a tree of files as `/` separated relative
//! paths and can read any of them back as text. Three sources ship with the
//! crate: a directory on disk, assets compiled in with `rust-embed`, and an
//! in-memory map used by tests and by hosts that generate SQL themselves.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;

use crate::error::{MigrateError, MigrateResult};

/// A readable tree of migration files.
///
/// Implementations are shared between concurrent load tasks.
pub trait MigrationSource: Send + Sync + 'static {
    /// Every file in the tree, as `/` separated paths relative to the root.
    fn list(&self) -> MigrateResult<Vec<String>>;

    /// Read the file at `path` (as returned by [`list`](Self::list)).
    fn read(&self, path: &str) -> MigrateResult<String>;

    /// Human-readable location, for log lines.
    fn describe(&self) -> String;
}

/// Migrations stored in a directory on disk, walked recursively.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> MigrateResult<()> {
        let entries =
            fs::read_dir(dir).map_err(|e| MigrateError::io(dir.display().to_string(), e))?;

        for entry in entries {
            let entry = entry.map_err(|e| MigrateError::io(dir.display().to_string(), e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| MigrateError::io(entry.path().display().to_string(), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };

            if file_type.is_dir() {
                self.walk(&entry.path(), &relative, out)?;
            } else {
                out.push(relative);
            }
        }
        Ok(())
    }
}

impl MigrationSource for DirSource {
    fn list(&self) -> MigrateResult<Vec<String>> {
        let mut files = Vec::new();
        self.walk(&self.root, "", &mut files)?;
        Ok(files)
    }

    fn read(&self, path: &str) -> MigrateResult<String> {
        let full = self.root.join(path);
        fs::read_to_string(&full).map_err(|e| MigrateError::io(full.display().to_string(), e))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Migrations compiled into the binary with `#[derive(RustEmbed)]`.
///
/// ```rust,ignore
/// #[derive(rust_embed::RustEmbed)]
/// #[folder = "migrations/"]
/// struct Migrations;
///
/// let source = EmbeddedSource::<Migrations>::new();
/// ```
pub struct EmbeddedSource<E: RustEmbed> {
    _assets: PhantomData<fn() -> E>,
}

impl<E: RustEmbed> EmbeddedSource<E> {
    pub fn new() -> Self {
        Self {
            _assets: PhantomData,
        }
    }
}

impl<E: RustEmbed> Default for EmbeddedSource<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: RustEmbed + 'static> MigrationSource for EmbeddedSource<E> {
    fn list(&self) -> MigrateResult<Vec<String>> {
        Ok(E::iter().map(|p| p.into_owned()).collect())
    }

    fn read(&self, path: &str) -> MigrateResult<String> {
        let file = E::get(path).ok_or_else(|| {
            MigrateError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "embedded file not found"),
            )
        })?;
        String::from_utf8(file.data.into_owned()).map_err(|e| {
            MigrateError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    fn describe(&self) -> String {
        format!("embedded:{}", std::any::type_name::<E>())
    }
}

/// Migrations held in memory, listed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Vec<(String, String)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file (builder style).
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push((path.into(), content.into()));
        self
    }
}

impl MigrationSource for MemorySource {
    fn list(&self) -> MigrateResult<Vec<String>> {
        Ok(self.files.iter().map(|(p, _)| p.clone()).collect())
    }

    fn read(&self, path: &str) -> MigrateResult<String> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| {
                MigrateError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such in-memory file"),
                )
            })
    }

    fn describe(&self) -> String {
        format!("memory ({} files)", self.files.len())
    }
}
