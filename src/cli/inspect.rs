//! Inspect command
//!
//! Dumps the header and the first records of a SCID file for eyeballing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::scid::{ScidReader, TickClass};

/// Arguments for inspect command
#[derive(Args)]
pub struct InspectArgs {
    /// SCID file to inspect
    pub file: PathBuf,

    /// Number of records to print
    #[arg(long, short = 'n', default_value = "10")]
    pub limit: usize,

    /// Print raw timestamps instead of UTC instants
    #[arg(long)]
    pub raw: bool,
}

/// Execute the inspect command
pub async fn execute(args: InspectArgs) -> Result<()> {
    let reader = ScidReader::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;

    let header = reader.header();
    println!("File:     {}", args.file.display());
    println!("Contract: {}", reader.contract());
    println!(
        "Header:   type={} header_size={} record_size={} version={}",
        header.file_type_id, header.header_size, header.record_size, header.version
    );
    println!();

    for (i, tick) in reader.take(args.limit).enumerate() {
        let tick = tick.with_context(|| format!("Failed to decode {}", args.file.display()))?;
        let class = match tick.class() {
            TickClass::Regular => "",
            TickClass::BundleFirst => " [bundle-first]",
            TickClass::BundleLast => " [bundle-last]",
        };
        let when = if args.raw {
            tick.raw_time.to_string()
        } else {
            tick.datetime().to_rfc3339()
        };
        println!(
            "{:>6}  {}  O={} H={} L={} C={} trades={} vol={} bid={} ask={}{}",
            i,
            when,
            tick.open,
            tick.high,
            tick.low,
            tick.close,
            tick.num_trades,
            tick.volume,
            tick.bid_volume,
            tick.ask_volume,
            class
        );
    }

    Ok(())
}
