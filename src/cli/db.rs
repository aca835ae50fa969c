//! Database management commands

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use crate::config::Settings;
use crate::storage::{TickSink, TickStore};

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Create destination tables for configured symbols
    Migrate(MigrateArgs),
    /// Show per-table statistics
    Stats(StatsArgs),
}

/// Arguments for migrate command
#[derive(Args)]
pub struct MigrateArgs {
    /// Only migrate one symbol's table
    #[arg(long, short)]
    pub symbol: Option<String>,
}

/// Arguments for stats command
#[derive(Args)]
pub struct StatsArgs {
    /// Only show one symbol's table
    #[arg(long, short)]
    pub symbol: Option<String>,
}

/// Execute database commands
pub async fn execute(cmd: DbCommands) -> Result<()> {
    match cmd {
        DbCommands::Migrate(args) => execute_migrate(args).await,
        DbCommands::Stats(args) => execute_stats(args).await,
    }
}

fn selected_symbols(settings: &Settings, symbol: &Option<String>) -> Result<Vec<String>> {
    match symbol {
        Some(name) => {
            if settings.symbol(name).is_none() {
                anyhow::bail!("Unknown symbol: {}", name);
            }
            Ok(vec![name.clone()])
        }
        None => Ok(settings.all_symbols()),
    }
}

async fn execute_migrate(args: MigrateArgs) -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    let symbols = selected_symbols(&settings, &args.symbol)?;

    let mut store = TickStore::connect(&settings.database.url).await?;
    for name in &symbols {
        if let Some(sym) = settings.symbol(name) {
            info!("Ensuring table {} for {}", sym.table_name, name);
            store.ensure_table(&sym.table_name).await?;
        }
    }
    store.close().await?;

    info!("Migrations completed");
    Ok(())
}

async fn execute_stats(args: StatsArgs) -> Result<()> {
    let settings = Settings::load().context("Failed to load configuration")?;
    let symbols = selected_symbols(&settings, &args.symbol)?;

    let mut store = TickStore::connect(&settings.database.url).await?;
    for name in &symbols {
        let Some(sym) = settings.symbol(name) else {
            continue;
        };

        let count = store.record_count(&sym.table_name).await?;
        println!("{} ({}):", name, sym.table_name);
        println!("  Records: {}", count);

        if let Some((earliest, latest)) = store.date_range(&sym.table_name).await? {
            println!("  Earliest: {}", earliest);
            println!("  Latest:   {}", latest);
        }

        let contracts = store.contracts(&sym.table_name).await?;
        if !contracts.is_empty() {
            println!("  Contracts: {}", contracts.join(", "));
        }
    }
    store.close().await?;

    Ok(())
}
