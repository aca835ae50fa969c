//! Command-line interface

pub mod db;
pub mod inspect;
pub mod resample;
pub mod sync;

use clap::{Parser, Subcommand};

/// SCID sync CLI
#[derive(Parser)]
#[command(name = "scid-sync")]
#[command(about = "Sync Sierra Chart intraday tick files into PostgreSQL")]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Sync configured SCID files into the database
    Sync(sync::SyncArgs),
    /// Resample a SCID file into OHLCV bars
    Resample(resample::ResampleArgs),
    /// Print decoded records from a SCID file
    Inspect(inspect::InspectArgs),
    /// Database operations
    #[command(subcommand)]
    Db(db::DbCommands),
}
