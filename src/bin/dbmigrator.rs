//! dbmigrator: apply versioned SQL migrations from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Apply every pending migration
//! dbmigrator --database-url postgres://localhost/app migrate up
//!
//! # Revert the latest one
//! dbmigrator migrate down
//!
//! # Start a new migration file
//! dbmigrator create add_users
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use dbmigrator::config::MigratorConfigBuilder;
use dbmigrator::prelude::*;

#[derive(Parser)]
#[command(name = "dbmigrator")]
#[command(version)]
#[command(about = "Apply versioned SQL migrations", long_about = None)]
#[command(after_help = "EXAMPLES:
    dbmigrator migrate up
    dbmigrator migrate down
    dbmigrator --dir db/migrations status
    dbmigrator create add_users")]
struct Cli {
    /// Config file (default: ./dbmigrator.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// SQL dialect (detected from the URL when omitted)
    #[arg(long)]
    dialect: Option<DialectKind>,

    /// Migrations directory
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Bookkeeping table name
    #[arg(long)]
    table: Option<String>,

    /// Report every unreadable migration instead of only the first
    #[arg(long)]
    collect_errors: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply or revert migrations
    Migrate {
        #[arg(value_enum)]
        direction: MigrateDirection,
    },
    /// Show installed and available versions
    Status,
    /// Create a new, empty migration file
    Create {
        /// Migration name, without whitespace
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum MigrateDirection {
    /// Apply all new database migrations
    Up,
    /// Rollback a single database migration
    Down,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("dbmigrator={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli)?;

    match &cli.command {
        Commands::Create { name } => {
            let path = create_migration(&config.migrations.dir, name)?;
            println!("{} {}", "Created".green().bold(), path.display());
            Ok(())
        }
        Commands::Status => {
            let migrator = dbmigrator::from_config(&config).await?;
            show_status(&migrator.status().await?);
            Ok(())
        }
        Commands::Migrate { direction } => {
            let migrator = dbmigrator::from_config(&config).await?;
            let report = match direction {
                MigrateDirection::Up => migrator.up().await?,
                MigrateDirection::Down => migrator.down().await?,
            };
            show_report(&report);
            Ok(())
        }
    }
}

/// Config file values, overridden by flags and `DATABASE_URL`.
fn resolve_config(cli: &Cli) -> anyhow::Result<MigratorConfig> {
    let file = MigratorConfig::discover(cli.config.as_deref()).context("loading config")?;
    let mut builder = MigratorConfigBuilder::from_config(file);

    if let Some(url) = &cli.database_url {
        builder = builder.database_url(url);
    }
    if let Some(kind) = cli.dialect {
        builder = builder.dialect(kind);
    }
    if let Some(dir) = &cli.dir {
        builder = builder.dir(dir);
    }
    if let Some(table) = &cli.table {
        builder = builder.table(table);
    }
    if cli.collect_errors {
        builder = builder.load_policy(LoadPolicy::CollectAll);
    }
    Ok(builder.build())
}

fn show_status(state: &MigrationState) {
    println!("{}", "Migration status".cyan().bold());
    println!("  installed: {}", state.installed_version.to_string().yellow());
    println!("  available: {}", state.available_version.to_string().yellow());

    match state.relation() {
        Relation::UpToDate => println!("{}", "✓ Up to date".green()),
        Relation::Inconsistent => println!(
            "{}",
            "⚠ Database is ahead of the migration files".yellow()
        ),
        Relation::Behind => {
            println!("{}", "Pending:".cyan());
            for m in state.pending() {
                println!("  {:04}  {}", m.version, m.name);
            }
        }
    }
}

fn show_report(report: &MigrationReport) {
    if report.versions.is_empty() {
        println!(
            "{} at version {}",
            "✓ Already up to date".green(),
            report.installed_after
        );
        return;
    }

    let verb = match report.direction {
        Direction::Up => "Applied",
        Direction::Down => "Reverted",
    };
    for v in &report.versions {
        println!("  {} {:04}", verb.green(), v);
    }
    println!(
        "{} {} -> {} ({:?})",
        "✓".green().bold(),
        report.installed_before,
        report.installed_after,
        report.elapsed
    );
}
