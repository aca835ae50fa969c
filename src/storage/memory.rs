//! In-memory sink for tests
//!
//! Mirrors the PostgreSQL store's conflict-skip semantics on the
//! `(datetime, raw_time)` key so pipeline tests can assert idempotence and
//! exactly-once loading without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{LoadOutcome, SinkConnector, StoreResult, TickRow, TickSink};

type TableKey = (i64, i64);
type Tables = HashMap<String, BTreeMap<TableKey, TickRow>>;

/// In-memory [`TickSink`] with the same idempotence contract as the
/// PostgreSQL store.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    tables: Arc<Mutex<Tables>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(row: &TickRow) -> TableKey {
        (row.datetime.timestamp_micros(), row.raw_time)
    }

    /// Rows currently in a table, in key order.
    pub fn rows(&self, table: &str) -> Vec<TickRow> {
        let tables = self.tables.lock().unwrap();
        tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.get(table).map(|t| t.len()).unwrap_or(0)
    }

    pub fn table_names(&self) -> Vec<String> {
        let tables = self.tables.lock().unwrap();
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl TickSink for MemorySink {
    async fn ensure_table(&mut self, table: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_string()).or_default();
        Ok(())
    }

    async fn load_batch(&mut self, table: &str, rows: &[TickRow]) -> StoreResult<LoadOutcome> {
        let mut tables = self.tables.lock().unwrap();
        let entries = tables.entry(table.to_string()).or_default();

        let mut outcome = LoadOutcome::default();
        for row in rows {
            if let std::collections::btree_map::Entry::Vacant(slot) =
                entries.entry(Self::key(row))
            {
                slot.insert(row.clone());
                outcome.inserted += 1;
            }
        }
        Ok(outcome)
    }

    async fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// Hands out clones of one shared [`MemorySink`] so parallel workers all
/// write into the same tables, like separate connections to one database.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    sink: MemorySink,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared sink, for inspecting loaded rows after a run.
    pub fn sink(&self) -> MemorySink {
        self.sink.clone()
    }
}

#[async_trait]
impl SinkConnector for MemoryConnector {
    type Sink = MemorySink;

    async fn connect(&self) -> StoreResult<MemorySink> {
        Ok(self.sink.clone())
    }
}
