//! Decoded tick record

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{raw_to_datetime, BUNDLE_TOLERANCE, FIRST_BUNDLE_TRADE, LAST_BUNDLE_TRADE};

/// Classification of a tick based on the Open field.
///
/// Sierra Chart flags the first and last trades of a multi-trade execution
/// bundle with huge sentinel values in the Open field. Those records carry
/// meaningful volume but no usable price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickClass {
    /// A normal trade with a real price.
    Regular,
    /// First trade in an execution bundle.
    BundleFirst,
    /// Last trade in an execution bundle.
    BundleLast,
}

/// A single decoded tick from a SCID file
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    /// Raw timestamp: microseconds since 1899-12-30T00:00:00Z
    pub raw_time: u64,
    pub open: f32,
    pub high: f32,
    pub low: f32,
    pub close: f32,
    pub num_trades: u32,
    pub volume: u32,
    pub bid_volume: u32,
    pub ask_volume: u32,
    /// Contract symbol of the owning file (e.g. ESZ24)
    pub contract: Arc<str>,
}

impl Tick {
    /// UTC instant for this tick.
    pub fn datetime(&self) -> DateTime<Utc> {
        raw_to_datetime(self.raw_time)
    }

    /// Classify the tick by its Open field.
    pub fn class(&self) -> TickClass {
        let open = self.open as f64;
        if (open - FIRST_BUNDLE_TRADE).abs() < BUNDLE_TOLERANCE {
            TickClass::BundleFirst
        } else if (open - LAST_BUNDLE_TRADE).abs() < BUNDLE_TOLERANCE {
            TickClass::BundleLast
        } else {
            TickClass::Regular
        }
    }

    /// True for ticks whose Open holds a real price rather than a sentinel.
    pub fn is_regular(&self) -> bool {
        (self.open as f64).abs() < BUNDLE_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_with_open(open: f32) -> Tick {
        Tick {
            raw_time: 0,
            open,
            high: 0.0,
            low: 0.0,
            close: 0.0,
            num_trades: 0,
            volume: 0,
            bid_volume: 0,
            ask_volume: 0,
            contract: Arc::from("ESZ24"),
        }
    }

    #[test]
    fn test_regular_classification() {
        let tick = tick_with_open(6531.25);
        assert_eq!(tick.class(), TickClass::Regular);
        assert!(tick.is_regular());

        // Zero open is still a regular trade (real price lives in Close).
        assert!(tick_with_open(0.0).is_regular());
    }

    #[test]
    fn test_bundle_classification() {
        let first = tick_with_open(FIRST_BUNDLE_TRADE as f32);
        assert_eq!(first.class(), TickClass::BundleFirst);
        assert!(!first.is_regular());

        let last = tick_with_open(LAST_BUNDLE_TRADE as f32);
        assert_eq!(last.class(), TickClass::BundleLast);
        assert!(!last.is_regular());
    }
}
