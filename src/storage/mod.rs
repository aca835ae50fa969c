//! Destination storage
//!
//! Defines the row shape loaded into the destination table and the
//! [`TickSink`] seam the orchestrator writes through. [`TickStore`] is the
//! PostgreSQL implementation; [`MemorySink`] is an in-memory implementation
//! used by tests.

mod memory;
mod store;

pub use memory::{MemoryConnector, MemorySink};
pub use store::{PgConnector, TickStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::scid::Tick;

/// Storage errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One destination-table row
///
/// `(datetime, raw_time)` is the uniqueness key; loads are idempotent on it.
#[derive(Debug, Clone, PartialEq)]
pub struct TickRow {
    pub datetime: DateTime<Utc>,
    pub raw_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub num_trades: i64,
    pub volume: i64,
    pub bid_volume: i64,
    pub ask_volume: i64,
    pub contract: String,
}

impl From<&Tick> for TickRow {
    fn from(tick: &Tick) -> Self {
        TickRow {
            datetime: tick.datetime(),
            raw_time: tick.raw_time as i64,
            open: tick.open as f64,
            high: tick.high as f64,
            low: tick.low as f64,
            close: tick.close as f64,
            num_trades: tick.num_trades as i64,
            volume: tick.volume as i64,
            bid_volume: tick.bid_volume as i64,
            ask_volume: tick.ask_volume as i64,
            contract: tick.contract.to_string(),
        }
    }
}

/// Result of loading one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Net-new rows after conflict-skip. A full retry of an already-loaded
    /// batch reports 0 here even though every row is present.
    pub inserted: u64,
    /// Malformed rows skipped by the row-by-row fallback.
    pub rejected: u64,
}

/// Write side of a destination store.
///
/// Implementations must be idempotent on the `(datetime, raw_time)` key:
/// loading the same batch twice leaves the same rows as loading it once.
#[async_trait]
pub trait TickSink: Send {
    /// Create the destination table and its uniqueness key if missing.
    async fn ensure_table(&mut self, table: &str) -> StoreResult<()>;

    /// Load a batch of rows, skipping key conflicts.
    async fn load_batch(&mut self, table: &str, rows: &[TickRow]) -> StoreResult<LoadOutcome>;

    /// Release the underlying connection.
    async fn close(&mut self) -> StoreResult<()>;
}

/// Opens one sink connection per call.
///
/// Fan-out workers each connect their own sink through this seam so no
/// connection is ever shared across workers.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    type Sink: TickSink + 'static;

    async fn connect(&self) -> StoreResult<Self::Sink>;
}
