//! SCID sync CLI
//!
//! Provides commands for:
//! - `sync`: Sync configured SCID files into the database
//! - `resample`: Resample a SCID file into OHLCV bars
//! - `inspect`: Print decoded records from a SCID file
//! - `db`: Database operations

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use scid_sync::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("scid_sync=info".parse()?))
        .init();

    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Execute command
    match cli.command {
        Commands::Sync(args) => {
            scid_sync::cli::sync::execute(args).await?;
        }
        Commands::Resample(args) => {
            scid_sync::cli::resample::execute(args).await?;
        }
        Commands::Inspect(args) => {
            scid_sync::cli::inspect::execute(args).await?;
        }
        Commands::Db(cmd) => {
            scid_sync::cli::db::execute(cmd).await?;
        }
    }

    Ok(())
}
