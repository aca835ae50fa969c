//! PostgreSQL tick store
//!
//! Owns a single connection per instance. Batches are bulk-loaded through a
//! temporary staging table with the COPY protocol, then moved into the
//! destination with conflict-skip so repeated loads never duplicate rows.
//! If the bulk path fails, a row-by-row fallback keeps one malformed row
//! from aborting the whole batch.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection, Row};
use tracing::{debug, warn};

use super::{LoadOutcome, SinkConnector, StoreError, StoreResult, TickRow, TickSink};

const COLUMNS: &str =
    "datetime, raw_time, open, high, low, close, num_trades, volume, bid_volume, ask_volume, contract";

static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape a text field for the COPY text format.
fn escape_copy_text(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Format a float the way PostgreSQL's text input expects.
fn fmt_f64(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        v.to_string()
    }
}

/// PostgreSQL destination store
///
/// Each instance owns exactly one connection; the staging table used by the
/// bulk path is session-scoped, so the connection must not be shared.
pub struct TickStore {
    conn: Option<PgConnection>,
}

impl TickStore {
    /// Connect to the database.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let conn = PgConnection::connect(url).await?;
        Ok(Self { conn: Some(conn) })
    }

    fn conn_mut(&mut self) -> StoreResult<&mut PgConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| StoreError::Configuration("connection already closed".into()))
    }

    /// Bulk path: COPY into a staging table, then move rows into the
    /// destination with conflict-skip. Returns the net-new row count.
    async fn bulk_load(&mut self, table: &str, rows: &[TickRow]) -> StoreResult<u64> {
        let staging = format!(
            "staging_{}_{}",
            table.to_lowercase(),
            STAGING_SEQ.fetch_add(1, Ordering::Relaxed)
        );

        let result = self.bulk_load_into(&staging, table, rows).await;

        // Best-effort cleanup; the temp table dies with the session anyway.
        let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&staging));
        if let Ok(conn) = self.conn_mut() {
            if let Err(e) = sqlx::query(&drop_sql).execute(conn).await {
                debug!("Failed to drop staging table {}: {}", staging, e);
            }
        }

        result
    }

    async fn bulk_load_into(
        &mut self,
        staging: &str,
        table: &str,
        rows: &[TickRow],
    ) -> StoreResult<u64> {
        let staging_ident = quote_ident(staging);
        let table_ident = quote_ident(table);

        let conn = self.conn_mut()?;
        sqlx::query(&format!(
            "CREATE TEMP TABLE {} (LIKE {} INCLUDING DEFAULTS)",
            staging_ident, table_ident
        ))
        .execute(&mut *conn)
        .await?;

        let mut payload = String::with_capacity(rows.len() * 96);
        for row in rows {
            payload.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
                row.datetime.format("%Y-%m-%d %H:%M:%S%.6f+00"),
                row.raw_time,
                fmt_f64(row.open),
                fmt_f64(row.high),
                fmt_f64(row.low),
                fmt_f64(row.close),
                row.num_trades,
                row.volume,
                row.bid_volume,
                row.ask_volume,
                escape_copy_text(&row.contract),
            ));
        }

        let mut copy = conn
            .copy_in_raw(&format!(
                "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
                staging_ident, COLUMNS
            ))
            .await?;
        copy.send(payload.as_bytes()).await?;
        copy.finish().await?;

        let moved = sqlx::query(&format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} ON CONFLICT (datetime, raw_time) DO NOTHING",
            table_ident, COLUMNS, COLUMNS, staging_ident
        ))
        .execute(self.conn_mut()?)
        .await?;

        Ok(moved.rows_affected())
    }

    /// Slow path: insert rows one at a time so a single malformed row is
    /// skipped and counted instead of failing the batch. Connectivity
    /// failures still propagate.
    async fn insert_rows(&mut self, table: &str, rows: &[TickRow]) -> StoreResult<LoadOutcome> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (datetime, raw_time) DO NOTHING",
            quote_ident(table),
            COLUMNS
        );

        let mut outcome = LoadOutcome::default();
        for row in rows {
            let result = sqlx::query(&sql)
                .bind(row.datetime)
                .bind(row.raw_time)
                .bind(row.open)
                .bind(row.high)
                .bind(row.low)
                .bind(row.close)
                .bind(row.num_trades)
                .bind(row.volume)
                .bind(row.bid_volume)
                .bind(row.ask_volume)
                .bind(&row.contract)
                .execute(self.conn_mut()?)
                .await;

            match result {
                Ok(done) => outcome.inserted += done.rows_affected(),
                // Constraint/type violations come back as database errors;
                // anything else is a connection problem and propagates.
                Err(sqlx::Error::Database(e)) => {
                    outcome.rejected += 1;
                    warn!(
                        "Skipping bad row (raw_time={}, contract={}): {}",
                        row.raw_time, row.contract, e
                    );
                }
                Err(e) => return Err(StoreError::Database(e)),
            }
        }
        Ok(outcome)
    }

    /// Total rows in a table.
    pub async fn record_count(&mut self, table: &str) -> StoreResult<i64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
                .fetch_one(self.conn_mut()?)
                .await?;
        Ok(count)
    }

    /// Earliest and latest datetime in a table, if any rows exist.
    pub async fn date_range(
        &mut self,
        table: &str,
    ) -> StoreResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let row = sqlx::query(&format!(
            "SELECT MIN(datetime) AS min_dt, MAX(datetime) AS max_dt FROM {}",
            quote_ident(table)
        ))
        .fetch_one(self.conn_mut()?)
        .await?;

        let min: Option<DateTime<Utc>> = row.get("min_dt");
        let max: Option<DateTime<Utc>> = row.get("max_dt");
        Ok(min.zip(max))
    }

    /// Distinct contract symbols present in a table.
    pub async fn contracts(&mut self, table: &str) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT contract FROM {} ORDER BY contract",
            quote_ident(table)
        ))
        .fetch_all(self.conn_mut()?)
        .await?;

        Ok(rows.iter().map(|r| r.get("contract")).collect())
    }

    /// Largest raw_time loaded so far, if any rows exist.
    pub async fn max_raw_time(&mut self, table: &str) -> StoreResult<Option<i64>> {
        let max: Option<i64> =
            sqlx::query_scalar(&format!("SELECT MAX(raw_time) FROM {}", quote_ident(table)))
                .fetch_one(self.conn_mut()?)
                .await?;
        Ok(max)
    }
}

#[async_trait]
impl TickSink for TickStore {
    async fn ensure_table(&mut self, table: &str) -> StoreResult<()> {
        let table_ident = quote_ident(table);
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                datetime TIMESTAMPTZ NOT NULL,
                raw_time BIGINT NOT NULL,
                open DOUBLE PRECISION NOT NULL,
                high DOUBLE PRECISION NOT NULL,
                low DOUBLE PRECISION NOT NULL,
                close DOUBLE PRECISION NOT NULL,
                num_trades BIGINT NOT NULL,
                volume BIGINT NOT NULL,
                bid_volume BIGINT NOT NULL,
                ask_volume BIGINT NOT NULL,
                contract TEXT NOT NULL,
                UNIQUE (datetime, raw_time)
            )
            "#,
            table_ident
        ))
        .execute(self.conn_mut()?)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (contract, datetime)",
            quote_ident(&format!("idx_{}_contract_dt", table.to_lowercase())),
            table_ident
        ))
        .execute(self.conn_mut()?)
        .await?;

        Ok(())
    }

    async fn load_batch(&mut self, table: &str, rows: &[TickRow]) -> StoreResult<LoadOutcome> {
        if rows.is_empty() {
            return Ok(LoadOutcome::default());
        }

        match self.bulk_load(table, rows).await {
            Ok(inserted) => {
                debug!("Bulk loaded {} net-new rows into {}", inserted, table);
                Ok(LoadOutcome {
                    inserted,
                    rejected: 0,
                })
            }
            Err(e) => {
                warn!(
                    "Bulk load into {} failed ({}), falling back to row-by-row",
                    table, e
                );
                self.insert_rows(table, rows).await
            }
        }
    }

    async fn close(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}

/// Connects [`TickStore`] sinks, one dedicated connection per call.
#[derive(Debug, Clone)]
pub struct PgConnector {
    url: String,
}

impl PgConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SinkConnector for PgConnector {
    type Sink = TickStore;

    async fn connect(&self) -> StoreResult<TickStore> {
        TickStore::connect(&self.url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("ES"), "\"ES\"");
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }

    #[test]
    fn test_escape_copy_text() {
        assert_eq!(escape_copy_text("ESZ24"), "ESZ24");
        assert_eq!(escape_copy_text("a\tb\nc\\d"), "a\\tb\\nc\\\\d");
    }

    #[test]
    fn test_fmt_f64() {
        assert_eq!(fmt_f64(6531.25), "6531.25");
        assert_eq!(fmt_f64(f64::NAN), "NaN");
        assert_eq!(fmt_f64(f64::INFINITY), "Infinity");
        assert_eq!(fmt_f64(f64::NEG_INFINITY), "-Infinity");
    }
}
