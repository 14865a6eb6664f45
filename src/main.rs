//! Thread Archive Importer
//!
//! Loads saved forum thread pages and the listing API's metadata feed into
//! a normalized SQLite store. Re-running refreshes counters on known threads.
//!
//! Usage:
//!   thread-import                      # Import everything under documents_dir
//!   thread-import --max 500            # Stop after 500 snapshots
//!   thread-import --db other.db        # Override the configured database
//!   thread-import --stats              # Show per-table row counts

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use thread_import::{snapshots, Config, Database, Importer, MetadataFeed};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "thread-import")]
#[command(about = "Import archived forum thread snapshots into SQLite")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config/settings.toml")]
    config: PathBuf,

    /// SQLite file, overriding [database] sqlite_path
    #[arg(long)]
    db: Option<PathBuf>,

    /// Maximum snapshots to import, overriding [import] max_documents
    #[arg(short, long)]
    max: Option<usize>,

    /// Show per-table row counts and exit
    #[arg(long)]
    stats: bool,

    /// Log per-document and per-field detail
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting thread importer...");

    // Load configuration
    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {}", args.config.display());

    // Initialize database
    let db_path = args.db.clone().unwrap_or_else(|| config.database.sqlite_path.clone());
    let mut db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    db.run_migrations()?;
    info!("Database initialized at {}", db_path.display());

    if args.stats {
        run_storage_stats(&db)
    } else {
        run_import(&mut db, &config, &args).await
    }
}

/// Show per-table row counts
fn run_storage_stats(db: &Database) -> Result<()> {
    println!("\nTable row counts:");
    for count in db.table_counts()? {
        println!("  {:<16} {:>10}", count.table, count.rows);
    }
    Ok(())
}

/// Import every snapshot that has a feed record
async fn run_import(db: &mut Database, config: &Config, args: &Args) -> Result<()> {
    let feed = MetadataFeed::load_dir(&config.sources.feed_dir)
        .await
        .with_context(|| format!("Failed to load feed from {}", config.sources.feed_dir.display()))?;

    let snapshots = snapshots::discover(&config.sources.documents_dir)?;
    info!(
        "Found {} snapshots in {}",
        snapshots.len(),
        config.sources.documents_dir.display()
    );

    let max = args.max.or(config.import.max_documents);
    let stats = Importer::new(db, &feed)
        .skip_malformed(config.import.skip_malformed)
        .import_all(&snapshots, max)
        .await?;

    info!("Import complete!");
    println!("\nImport complete:");
    println!("  Total processed:      {}", stats.total);
    println!("  Created:              {}", stats.created);
    println!("  Updated:              {}", stats.updated);
    println!("  Skipped (unknown):    {}", stats.skipped_unknown);
    println!("  Skipped (malformed):  {}", stats.skipped_malformed);
    println!("  Failed:               {}", stats.failed);

    Ok(())
}
