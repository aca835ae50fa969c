//! Sync orchestration
//!
//! Drives contract files through a two-stage pipeline: a blocking decode
//! task streams batches of rows over a bounded channel to an async loader
//! that writes them through a [`TickSink`]. Completed files are recorded in
//! the checkpoint store before the next file starts, so re-runs skip work
//! already made durable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::{Settings, SymbolSettings};
use crate::scid::{ScidError, ScidReader};
use crate::storage::{SinkConnector, StoreError, TickRow, TickSink};

/// Orchestration errors
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Decode error in {file}: {source}")]
    Decode {
        file: PathBuf,
        #[source]
        source: ScidError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Worker task failed: {0}")]
    Join(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Aggregate counters for one sync run
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStats {
    pub files_synced: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    /// Records decoded from the source files
    pub processed: u64,
    /// Net-new rows after conflict-skip
    pub inserted: u64,
    /// Malformed rows skipped by the loader
    pub rejected: u64,
    pub elapsed_seconds: f64,
}

impl SyncStats {
    pub fn records_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.processed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    fn absorb(&mut self, outcome: &FileOutcome) {
        self.files_synced += 1;
        self.processed += outcome.processed;
        self.inserted += outcome.inserted;
        self.rejected += outcome.rejected;
    }
}

/// Result of syncing one contract file
#[derive(Debug, Clone, Copy)]
struct FileOutcome {
    processed: u64,
    inserted: u64,
    rejected: u64,
    /// Byte offset reached in the source file
    position: u64,
}

/// Batch/queue sizing for the decode-load pipeline
#[derive(Debug, Clone, Copy)]
struct PipelineConfig {
    batch_size: usize,
    queue_depth: usize,
}

/// Work order for one contract file
#[derive(Debug, Clone)]
struct FileJob {
    file: PathBuf,
    table: String,
    start: Option<chrono::DateTime<chrono::Utc>>,
    end: Option<chrono::DateTime<chrono::Utc>>,
    resume_position: Option<u64>,
}

/// Drives SCID files into a destination store
///
/// Generic over the sink connector so tests can run the full pipeline
/// against an in-memory store.
pub struct SyncEngine<C: SinkConnector + 'static> {
    connector: Arc<C>,
    settings: Arc<Settings>,
}

impl<C: SinkConnector + 'static> SyncEngine<C> {
    pub fn new(connector: C, settings: Settings) -> Self {
        Self {
            connector: Arc::new(connector),
            settings: Arc::new(settings),
        }
    }

    fn symbol_settings(&self, symbol: &str) -> SyncResult<&SymbolSettings> {
        self.settings
            .symbol(symbol)
            .ok_or_else(|| SyncError::UnknownSymbol(symbol.to_string()))
    }

    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.settings.storage.batch_size.max(1),
            queue_depth: self.settings.storage.queue_depth.max(1),
        }
    }

    /// Build the job list for a symbol, skipping files the checkpoint store
    /// records as completed.
    fn pending_jobs(
        &self,
        symbol: &str,
        sym: &SymbolSettings,
        checkpoints: &CheckpointStore,
        stats: &mut SyncStats,
    ) -> Vec<FileJob> {
        let mut jobs = Vec::new();
        for contract in &sym.contracts {
            if checkpoints.is_completed(symbol, &contract.file) {
                info!("Skipping completed file {}", contract.file.display());
                stats.files_skipped += 1;
                continue;
            }
            jobs.push(FileJob {
                file: contract.file.clone(),
                table: sym.table_name.clone(),
                start: contract.start(),
                end: contract.end(),
                resume_position: checkpoints.last_position(symbol, &contract.file),
            });
        }
        jobs
    }

    /// Sync one symbol's contract files in order over a single connection.
    ///
    /// A decode failure abandons that file and moves on; storage failures
    /// abort the run since every later batch would hit the same connection.
    pub async fn sync_symbol(
        &self,
        symbol: &str,
        checkpoints: &mut CheckpointStore,
    ) -> SyncResult<SyncStats> {
        let sym = self.symbol_settings(symbol)?.clone();
        let pipeline = self.pipeline_config();
        let started = Instant::now();
        let mut stats = SyncStats::default();

        let jobs = self.pending_jobs(symbol, &sym, checkpoints, &mut stats);
        if jobs.is_empty() {
            info!("Nothing to sync for {}", symbol);
            stats.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(stats);
        }

        let mut sink = self.connector.connect().await?;
        sink.ensure_table(&sym.table_name).await?;

        for job in jobs {
            match sync_file(&mut sink, &job, pipeline).await {
                Ok(outcome) => {
                    checkpoints.set_position(symbol, &job.file, outcome.position);
                    checkpoints.set_completed(symbol, &job.file, true);
                    checkpoints.save()?;
                    stats.absorb(&outcome);
                    info!(
                        "Synced {}: {} records, {} inserted, {} rejected",
                        job.file.display(),
                        outcome.processed,
                        outcome.inserted,
                        outcome.rejected
                    );
                }
                Err(e @ SyncError::Decode { .. }) => {
                    error!("Abandoning {}: {}", job.file.display(), e);
                    stats.files_failed += 1;
                }
                Err(e) => {
                    sink.close().await.ok();
                    return Err(e);
                }
            }
        }

        sink.close().await?;
        stats.elapsed_seconds = started.elapsed().as_secs_f64();
        self.report(symbol, &stats);
        Ok(stats)
    }

    /// Sync one symbol's contract files concurrently, one worker and one
    /// connection per file. Checkpoints are committed after all workers
    /// join, from the per-file results.
    pub async fn sync_symbol_parallel(
        &self,
        symbol: &str,
        checkpoints: &mut CheckpointStore,
    ) -> SyncResult<SyncStats> {
        let sym = self.symbol_settings(symbol)?.clone();
        let pipeline = self.pipeline_config();
        let started = Instant::now();
        let mut stats = SyncStats::default();

        let jobs = self.pending_jobs(symbol, &sym, checkpoints, &mut stats);
        if jobs.is_empty() {
            info!("Nothing to sync for {}", symbol);
            stats.elapsed_seconds = started.elapsed().as_secs_f64();
            return Ok(stats);
        }

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let connector = self.connector.clone();
            handles.push(tokio::spawn(async move {
                let result = run_file_worker(connector, &job, pipeline).await;
                (job, result)
            }));
        }

        let mut first_error = None;
        for handle in handles {
            let (job, result) = handle
                .await
                .map_err(|e| SyncError::Join(e.to_string()))?;
            match result {
                Ok(outcome) => {
                    checkpoints.set_position(symbol, &job.file, outcome.position);
                    checkpoints.set_completed(symbol, &job.file, true);
                    stats.absorb(&outcome);
                }
                Err(e @ SyncError::Decode { .. }) => {
                    error!("Abandoning {}: {}", job.file.display(), e);
                    stats.files_failed += 1;
                }
                Err(e) => {
                    error!("Worker for {} failed: {}", job.file.display(), e);
                    stats.files_failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        checkpoints.save()?;

        if let Some(e) = first_error {
            return Err(e);
        }

        stats.elapsed_seconds = started.elapsed().as_secs_f64();
        self.report(symbol, &stats);
        Ok(stats)
    }

    /// Sync every configured symbol.
    pub async fn sync_all(
        &self,
        checkpoints: &mut CheckpointStore,
        parallel: bool,
    ) -> SyncResult<SyncStats> {
        let started = Instant::now();
        let mut total = SyncStats::default();

        for symbol in self.settings.all_symbols() {
            let stats = if parallel {
                self.sync_symbol_parallel(&symbol, checkpoints).await?
            } else {
                self.sync_symbol(&symbol, checkpoints).await?
            };
            total.files_synced += stats.files_synced;
            total.files_skipped += stats.files_skipped;
            total.files_failed += stats.files_failed;
            total.processed += stats.processed;
            total.inserted += stats.inserted;
            total.rejected += stats.rejected;
        }

        total.elapsed_seconds = started.elapsed().as_secs_f64();
        Ok(total)
    }

    fn report(&self, symbol: &str, stats: &SyncStats) {
        info!(
            "Sync {} done: {} files ({} skipped, {} failed), {} records, {} inserted, {} rejected in {:.2}s ({:.0} rec/s)",
            symbol,
            stats.files_synced,
            stats.files_skipped,
            stats.files_failed,
            stats.processed,
            stats.inserted,
            stats.rejected,
            stats.elapsed_seconds,
            stats.records_per_second()
        );
    }
}

/// Connect a dedicated sink and run one file through the pipeline.
async fn run_file_worker<C: SinkConnector>(
    connector: Arc<C>,
    job: &FileJob,
    pipeline: PipelineConfig,
) -> SyncResult<FileOutcome> {
    let mut sink = connector.connect().await?;
    sink.ensure_table(&job.table).await?;
    let result = sync_file(&mut sink, job, pipeline).await;
    let closed = sink.close().await;
    let outcome = result?;
    closed?;
    Ok(outcome)
}

/// Decode one SCID file on a blocking task and load its batches through
/// `sink`, hand-off bounded by the channel depth.
async fn sync_file<S: TickSink>(
    sink: &mut S,
    job: &FileJob,
    pipeline: PipelineConfig,
) -> SyncResult<FileOutcome> {
    let (tx, mut rx) = mpsc::channel::<(Vec<TickRow>, u64)>(pipeline.queue_depth);

    let file = job.file.clone();
    let start = job.start;
    let end = job.end;
    let resume = job.resume_position;
    let batch_size = pipeline.batch_size;

    let producer = tokio::task::spawn_blocking(move || -> Result<u64, ScidError> {
        let mut reader = ScidReader::open(&file)?.with_range(start, end);
        if let Some(position) = resume {
            reader.seek_to(position)?;
        }

        let mut batch = Vec::with_capacity(batch_size);
        let mut processed = 0u64;
        while let Some(tick) = reader.next() {
            let tick = tick?;
            processed += 1;
            batch.push(TickRow::from(&tick));
            if batch.len() >= batch_size {
                let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                if tx.blocking_send((full, reader.position())).is_err() {
                    // Loader stopped; its error surfaces on the other side.
                    return Ok(processed);
                }
            }
        }
        if !batch.is_empty() {
            let _ = tx.blocking_send((batch, reader.position()));
        }
        Ok(processed)
    });

    let mut inserted = 0u64;
    let mut rejected = 0u64;
    let mut position = resume.unwrap_or(0);
    let mut load_error = None;

    while let Some((rows, reached)) = rx.recv().await {
        match sink.load_batch(&job.table, &rows).await {
            Ok(outcome) => {
                inserted += outcome.inserted;
                rejected += outcome.rejected;
                position = reached;
            }
            Err(e) => {
                load_error = Some(e);
                rx.close();
                break;
            }
        }
    }
    // Drain anything buffered after an early close so the producer unblocks.
    drop(rx);

    let processed = producer
        .await
        .map_err(|e| SyncError::Join(e.to_string()))?
        .map_err(|source| SyncError::Decode {
            file: job.file.clone(),
            source,
        })?;

    if let Some(e) = load_error {
        warn!(
            "Load failed for {} at byte {}: {}",
            job.file.display(),
            position,
            e
        );
        return Err(SyncError::Storage(e));
    }

    Ok(FileOutcome {
        processed,
        inserted,
        rejected,
        position,
    })
}
