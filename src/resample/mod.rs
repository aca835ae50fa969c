//! Tick-to-OHLCV resampling
//!
//! Aggregates cleaned ticks into fixed-width time buckets. Bucketing is done
//! on the raw integer timestamp; the bucket index is converted to an instant
//! once per output bar, not once per tick.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, Duration, Utc};

use crate::scid::{raw_to_datetime, Tick};

/// One OHLCV bar for a single time bucket
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Start instant of the bucket
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub num_trades: u64,
    pub volume: u64,
    pub bid_volume: u64,
    pub ask_volume: u64,
}

struct BarAccum {
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    num_trades: u64,
    volume: u64,
    bid_volume: u64,
    ask_volume: u64,
}

impl BarAccum {
    fn new(open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            num_trades: 0,
            volume: 0,
            bid_volume: 0,
            ask_volume: 0,
        }
    }

    fn update(&mut self, high: f64, low: f64, close: f64) {
        self.high = self.high.max(high);
        self.low = self.low.min(low);
        self.close = close;
    }

    fn add_counts(&mut self, tick: &Tick) {
        self.num_trades += tick.num_trades as u64;
        self.volume += tick.volume as u64;
        self.bid_volume += tick.bid_volume as u64;
        self.ask_volume += tick.ask_volume as u64;
    }
}

/// Aggregate a chronological tick stream into OHLCV bars.
///
/// Cleaning is applied per tick before aggregation, in this order:
/// 1. bundle-marker ticks are dropped entirely;
/// 2. a 0.0 Open is replaced with the tick's Close;
/// 3. O/H/L/C are scaled by `price_multiplier`.
///
/// Open is the first tick per bucket, Close the last, High/Low the extremes,
/// and the count fields are summed. The result only depends on the ticks
/// themselves, not on how the stream was chunked. An empty (or fully
/// filtered) input yields an empty Vec.
pub fn aggregate<I>(ticks: I, bucket_width: Duration, price_multiplier: f64) -> Vec<Bar>
where
    I: IntoIterator<Item = Tick>,
{
    let width_us = bucket_width.num_microseconds().unwrap_or(60_000_000).max(1) as u64;
    let mut buckets: BTreeMap<u64, BarAccum> = BTreeMap::new();

    for tick in ticks {
        if !tick.is_regular() {
            continue;
        }

        let mut open = tick.open as f64;
        let close = tick.close as f64;
        if open == 0.0 {
            open = close;
        }
        let open = open * price_multiplier;
        let high = tick.high as f64 * price_multiplier;
        let low = tick.low as f64 * price_multiplier;
        let close = close * price_multiplier;

        let index = tick.raw_time / width_us;
        let accum = buckets
            .entry(index)
            .and_modify(|a| a.update(high, low, close))
            .or_insert_with(|| BarAccum::new(open, high, low, close));
        accum.add_counts(&tick);
    }

    buckets
        .into_iter()
        .map(|(index, a)| Bar {
            bucket_start: raw_to_datetime(index * width_us),
            open: a.open,
            high: a.high,
            low: a.low,
            close: a.close,
            num_trades: a.num_trades,
            volume: a.volume,
            bid_volume: a.bid_volume,
            ask_volume: a.ask_volume,
        })
        .collect()
}

/// Write bars as CSV with a header row.
pub fn write_csv<W: Write>(writer: &mut W, bars: &[Bar]) -> std::io::Result<()> {
    writeln!(
        writer,
        "DateTime,Open,High,Low,Close,Trades,Volume,BidVolume,AskVolume"
    )?;
    for bar in bars {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            bar.bucket_start.to_rfc3339(),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.num_trades,
            bar.volume,
            bar.bid_volume,
            bar.ask_volume
        )?;
    }
    Ok(())
}
