//! Drop-in command handling for host binaries.
//!
//! A host application can forward its own `argv` here and get `migrate up`,
//! `migrate down` and `help` without writing a CLI of its own.

use crate::error::MigrateResult;
use crate::migrator::Migrator;

/// A recognised migrator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    MigrateUp,
    MigrateDown,
}

impl Command {
    /// Recognise `args` (without the program name). `None` for anything else.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let words: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();
        match words.as_slice() {
            ["help", ..] => Some(Self::Help),
            ["migrate", "up", ..] => Some(Self::MigrateUp),
            ["migrate", "down", ..] => Some(Self::MigrateDown),
            _ => None,
        }
    }
}

/// Usage text for the embedded commands.
pub fn help_text() -> &'static str {
    "\n    migrate up     - Apply all new database migrations.\n    migrate down   - Rollback a single database migration."
}

/// Run the command named by `args`.
///
/// `Ok(true)` means a command was recognised and ran; `Ok(false)` means the
/// arguments were not a migrator command and the host should handle them.
pub async fn handle_command<S: AsRef<str>>(migrator: &Migrator, args: &[S]) -> MigrateResult<bool> {
    let Some(command) = Command::parse(args) else {
        return Ok(false);
    };

    match command {
        Command::Help => println!("{}", help_text()),
        Command::MigrateUp => {
            migrator.up().await?;
        }
        Command::MigrateDown => {
            migrator.down().await?;
        }
    }
    Ok(true)
}
