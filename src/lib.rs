//! SCID tick-tape sync
//!
//! Decodes Sierra Chart intraday (SCID) tick files, resamples them into
//! OHLCV bars, and loads them into PostgreSQL with checkpointed, idempotent
//! batch inserts.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod resample;
pub mod scid;
pub mod storage;
pub mod sync;

pub use checkpoint::CheckpointStore;
pub use config::Settings;
pub use scid::{ScidReader, Tick};
pub use storage::{TickRow, TickSink, TickStore};
pub use sync::{SyncEngine, SyncStats};
