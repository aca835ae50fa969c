//! Resample command
//!
//! Decodes one SCID file and writes fixed-width OHLCV bars as CSV.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::resample::{aggregate, write_csv};
use crate::scid::ScidReader;

/// Arguments for resample command
#[derive(Args)]
pub struct ResampleArgs {
    /// SCID file to resample
    pub file: PathBuf,

    /// Output CSV path (defaults to the input with a .csv extension)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Bucket width in seconds
    #[arg(long, default_value = "60")]
    pub bucket_secs: u32,

    /// Multiplier applied to prices (e.g. 0.01 for prices stored x100)
    #[arg(long, default_value = "1.0")]
    pub multiplier: f64,

    /// First date to include (inclusive, UTC)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// First date to exclude (exclusive, UTC)
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

/// Execute the resample command
pub async fn execute(args: ResampleArgs) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.file.with_extension("csv"));

    let start = args
        .start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());
    let end = args
        .end
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .context("Invalid progress template")?,
    );
    pb.set_message(format!("Decoding {}", args.file.display()));

    let file = args.file.clone();
    let bucket = Duration::seconds(args.bucket_secs.max(1) as i64);
    let multiplier = args.multiplier;

    let bars = tokio::task::spawn_blocking(move || -> Result<_> {
        let reader = ScidReader::open(&file)
            .with_context(|| format!("Failed to open {}", file.display()))?
            .with_range(start, end);
        let contract = reader.contract().to_string();

        let mut ticks = Vec::new();
        for tick in reader {
            let tick = tick.with_context(|| format!("Failed to decode {}", file.display()))?;
            ticks.push(tick);
            if ticks.len() % 100_000 == 0 {
                pb.set_message(format!("Decoded {} records", ticks.len()));
            }
        }

        pb.set_message(format!("Aggregating {} records for {}", ticks.len(), contract));
        let bars = aggregate(ticks, bucket, multiplier);
        pb.finish_with_message(format!("Resampled {} into {} bars", contract, bars.len()));
        Ok(bars)
    })
    .await??;

    let mut writer = BufWriter::new(
        File::create(&output).with_context(|| format!("Failed to create {}", output.display()))?,
    );
    write_csv(&mut writer, &bars)?;

    info!("Wrote {} bars to {}", bars.len(), output.display());
    println!("Wrote {} bars to {}", bars.len(), output.display());
    Ok(())
}
