//! Sync command

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::config::Settings;
use crate::storage::PgConnector;
use crate::sync::SyncEngine;

/// Arguments for sync command
#[derive(Args)]
pub struct SyncArgs {
    /// Symbol to sync (all configured symbols if omitted)
    #[arg(long, short)]
    pub symbol: Option<String>,

    /// Sync contract files concurrently, one connection per file
    #[arg(long)]
    pub parallel: bool,
}

/// Execute the sync command
pub async fn execute(args: SyncArgs) -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    let mut checkpoints = CheckpointStore::load(settings.checkpoint_path.clone())
        .context("Failed to load checkpoint state")?;

    let connector = PgConnector::new(settings.database.url.as_str());
    let engine = SyncEngine::new(connector, settings.clone());

    info!("Starting sync (parallel: {})", args.parallel);

    let stats = match &args.symbol {
        Some(symbol) => {
            if args.parallel {
                engine.sync_symbol_parallel(symbol, &mut checkpoints).await?
            } else {
                engine.sync_symbol(symbol, &mut checkpoints).await?
            }
        }
        None => engine.sync_all(&mut checkpoints, args.parallel).await?,
    };

    println!("Sync complete:");
    println!("  Files synced:  {}", stats.files_synced);
    println!("  Files skipped: {}", stats.files_skipped);
    println!("  Files failed:  {}", stats.files_failed);
    println!("  Records:       {}", stats.processed);
    println!("  Inserted:      {}", stats.inserted);
    println!("  Rejected:      {}", stats.rejected);
    println!(
        "  Elapsed:       {:.2}s ({:.0} rec/s)",
        stats.elapsed_seconds,
        stats.records_per_second()
    );

    Ok(())
}
