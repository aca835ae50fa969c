//! Sierra Chart intraday (SCID) file decoding
//!
//! A SCID file is a 56-byte header followed by fixed 40-byte little-endian
//! records. Timestamps are unsigned 64-bit microsecond counts since
//! 1899-12-30T00:00:00Z, converted here through an integer epoch offset only.

mod reader;
mod tick;

pub use reader::{contract_from_path, Header, ScidReader};
pub use tick::{Tick, TickClass};

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 56;
/// Size of one tick record in bytes.
pub const RECORD_SIZE: usize = 40;

/// Microseconds from the SCID epoch (1899-12-30) to the Unix epoch.
pub const EPOCH_OFFSET_US: i64 = 2_209_161_600_000_000;

/// Sentinel written to the Open field of the first trade in an execution bundle.
pub const FIRST_BUNDLE_TRADE: f64 = -19990009513251226345509817234554355712.0;
/// Sentinel written to the Open field of the last trade in an execution bundle.
pub const LAST_BUNDLE_TRADE: f64 = -19990019654456028171345029208179998720.0;
/// Tolerance when comparing the Open field against the bundle sentinels.
pub const BUNDLE_TOLERANCE: f64 = 1e10;

/// Errors during SCID decoding
#[derive(Error, Debug)]
pub enum ScidError {
    #[error("File too small to contain a valid {HEADER_SIZE}-byte header")]
    ShortHeader,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert a raw SCID timestamp to a UTC instant.
pub fn raw_to_datetime(raw_time: u64) -> DateTime<Utc> {
    let unix_us = raw_time as i64 - EPOCH_OFFSET_US;
    DateTime::from_timestamp_micros(unix_us).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Convert a UTC instant to a raw SCID timestamp.
pub fn datetime_to_raw(dt: DateTime<Utc>) -> u64 {
    (dt.timestamp_micros() + EPOCH_OFFSET_US).max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_epoch_conversion() {
        // The SCID epoch itself maps to 1899-12-30.
        let dt = raw_to_datetime(0);
        assert_eq!(dt, Utc.with_ymd_and_hms(1899, 12, 30, 0, 0, 0).unwrap());

        // The offset lands exactly on the Unix epoch.
        let dt = raw_to_datetime(EPOCH_OFFSET_US as u64);
        assert_eq!(dt, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_conversion_round_trip() {
        let dt = Utc.with_ymd_and_hms(2024, 9, 16, 13, 30, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(raw_to_datetime(datetime_to_raw(dt)), dt);
    }
}
