//! End-to-end pipeline tests over an in-memory store.
//!
//! Builds synthetic SCID files on disk and runs them through the full
//! decode/batch/load pipeline, checking the durability properties the
//! checkpoint and conflict-skip machinery promise: re-runs and resumes
//! never duplicate rows, rollover windows load each record exactly once,
//! and parallel workers produce the same table as a sequential run.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeZone, Utc};

use scid_sync::checkpoint::CheckpointStore;
use scid_sync::config::{
    ContractSettings, DatabaseSettings, Settings, StorageSettings, SymbolSettings,
};
use scid_sync::scid::{datetime_to_raw, HEADER_SIZE, RECORD_SIZE};
use scid_sync::storage::MemoryConnector;
use scid_sync::sync::SyncEngine;

fn write_scid(path: &Path, raws: &[u64]) {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + raws.len() * RECORD_SIZE);
    bytes.extend_from_slice(b"SCID");
    bytes.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    bytes.extend_from_slice(&(RECORD_SIZE as u32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&[0u8; 36]);
    for (i, &raw) in raws.iter().enumerate() {
        let price = 100.0 + i as f32;
        bytes.extend_from_slice(&raw.to_le_bytes());
        for v in [price, price + 1.0, price - 1.0, price + 0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in [1u32, 10, 4, 6] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    let mut f = std::fs::File::create(path).unwrap();
    f.write_all(&bytes).unwrap();
}

fn raw_at(date: NaiveDate, hour: u32, min: u32) -> u64 {
    let dt = Utc
        .from_utc_datetime(&date.and_hms_opt(hour, min, 0).unwrap());
    datetime_to_raw(dt)
}

fn settings(contracts: Vec<ContractSettings>, batch_size: usize) -> Settings {
    let mut symbols = BTreeMap::new();
    symbols.insert(
        "ES".to_string(),
        SymbolSettings {
            table_name: "es_ticks".to_string(),
            price_multiplier: 1.0,
            contracts,
        },
    );
    Settings {
        database: DatabaseSettings {
            url: "postgresql://unused".into(),
        },
        storage: StorageSettings {
            batch_size,
            queue_depth: 2,
        },
        checkpoint_path: PathBuf::from("checkpoint.json"),
        symbols,
    }
}

fn contract(file: PathBuf, start: Option<NaiveDate>, end: Option<NaiveDate>) -> ContractSettings {
    ContractSettings {
        file,
        start_date: start,
        end_date: end,
    }
}

#[tokio::test]
async fn test_double_sync_inserts_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("ESZ24_FUT_CME.scid");
    let day = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
    write_scid(
        &file,
        &[
            raw_at(day, 13, 30),
            raw_at(day, 13, 31),
            raw_at(day, 13, 32),
            raw_at(day, 13, 33),
            raw_at(day, 13, 34),
        ],
    );

    let connector = MemoryConnector::new();
    let sink = connector.sink();
    let engine = SyncEngine::new(
        connector,
        settings(vec![contract(file.clone(), None, None)], 2),
    );

    let mut first_cp = CheckpointStore::load(dir.path().join("cp1.json")).unwrap();
    let stats = engine.sync_symbol("ES", &mut first_cp).await.unwrap();
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.inserted, 5);

    // A lost checkpoint forces a full re-read; conflict-skip must report
    // zero net-new rows and leave the table unchanged.
    let mut second_cp = CheckpointStore::load(dir.path().join("cp2.json")).unwrap();
    let stats = engine.sync_symbol("ES", &mut second_cp).await.unwrap();
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.inserted, 0);
    assert_eq!(sink.row_count("es_ticks"), 5);
}

#[tokio::test]
async fn test_rerun_with_checkpoint_skips_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("ESZ24_FUT_CME.scid");
    let day = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
    write_scid(&file, &[raw_at(day, 13, 30), raw_at(day, 13, 31)]);

    let connector = MemoryConnector::new();
    let engine = SyncEngine::new(
        connector,
        settings(vec![contract(file.clone(), None, None)], 10),
    );

    let mut cp = CheckpointStore::load(dir.path().join("cp.json")).unwrap();
    engine.sync_symbol("ES", &mut cp).await.unwrap();

    // Reload the persisted checkpoint the way a fresh process would.
    let mut cp = CheckpointStore::load(dir.path().join("cp.json")).unwrap();
    let stats = engine.sync_symbol("ES", &mut cp).await.unwrap();
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(stats.files_synced, 0);
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn test_resume_from_recorded_position() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("ESZ24_FUT_CME.scid");
    let day = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
    write_scid(
        &file,
        &[
            raw_at(day, 13, 30),
            raw_at(day, 13, 31),
            raw_at(day, 13, 32),
            raw_at(day, 13, 33),
        ],
    );

    let connector = MemoryConnector::new();
    let sink = connector.sink();
    let engine = SyncEngine::new(
        connector,
        settings(vec![contract(file.clone(), None, None)], 10),
    );

    // Simulate a run that died after loading the first two records.
    let mut cp = CheckpointStore::load(dir.path().join("cp.json")).unwrap();
    cp.set_position("ES", &file, (HEADER_SIZE + 2 * RECORD_SIZE) as u64);

    let stats = engine.sync_symbol("ES", &mut cp).await.unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.inserted, 2);
    assert_eq!(sink.row_count("es_ticks"), 2);
    assert!(cp.is_completed("ES", &file));

    // The resumed rows are the tail of the file.
    let rows = sink.rows("es_ticks");
    assert_eq!(rows[0].raw_time, raw_at(day, 13, 32) as i64);
    assert_eq!(rows[1].raw_time, raw_at(day, 13, 33) as i64);
}

#[tokio::test]
async fn test_rollover_windows_load_each_record_once() {
    let dir = tempfile::tempdir().unwrap();
    let d0 = NaiveDate::from_ymd_opt(2024, 12, 19).unwrap();
    let d1 = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();

    // Both files carry the record at the rollover instant; the exclusive
    // end of the old window and the inclusive start of the new one assign
    // it to the successor contract only.
    let shared = raw_at(d1, 0, 0);
    let old_file = dir.path().join("ESZ24_FUT_CME.scid");
    let new_file = dir.path().join("ESH25_FUT_CME.scid");
    write_scid(&old_file, &[raw_at(d0, 13, 30), raw_at(d0, 13, 31), shared]);
    write_scid(&new_file, &[shared, raw_at(d1, 13, 30)]);

    let connector = MemoryConnector::new();
    let sink = connector.sink();
    let engine = SyncEngine::new(
        connector,
        settings(
            vec![
                contract(old_file, None, Some(d1)),
                contract(new_file, Some(d1), None),
            ],
            10,
        ),
    );

    let mut cp = CheckpointStore::load(dir.path().join("cp.json")).unwrap();
    let stats = engine.sync_symbol("ES", &mut cp).await.unwrap();

    assert_eq!(stats.processed, 4);
    assert_eq!(stats.inserted, 4);
    let rows = sink.rows("es_ticks");
    assert_eq!(rows.len(), 4);

    let at_rollover: Vec<_> = rows
        .iter()
        .filter(|r| r.raw_time == shared as i64)
        .collect();
    assert_eq!(at_rollover.len(), 1);
    assert_eq!(at_rollover[0].contract, "ESH25");
}

#[tokio::test]
async fn test_parallel_run_matches_sequential() {
    let dir = tempfile::tempdir().unwrap();
    let d0 = NaiveDate::from_ymd_opt(2024, 12, 19).unwrap();
    let d1 = NaiveDate::from_ymd_opt(2024, 12, 20).unwrap();

    let old_file = dir.path().join("ESZ24_FUT_CME.scid");
    let new_file = dir.path().join("ESH25_FUT_CME.scid");
    write_scid(
        &old_file,
        &[raw_at(d0, 9, 0), raw_at(d0, 9, 1), raw_at(d0, 9, 2)],
    );
    write_scid(&new_file, &[raw_at(d1, 9, 0), raw_at(d1, 9, 1)]);

    let contracts = vec![
        contract(old_file, None, Some(d1)),
        contract(new_file, Some(d1), None),
    ];

    let sequential = MemoryConnector::new();
    let sequential_sink = sequential.sink();
    let engine = SyncEngine::new(sequential, settings(contracts.clone(), 2));
    let mut cp = CheckpointStore::load(dir.path().join("cp_seq.json")).unwrap();
    engine.sync_symbol("ES", &mut cp).await.unwrap();

    let parallel = MemoryConnector::new();
    let parallel_sink = parallel.sink();
    let engine = SyncEngine::new(parallel, settings(contracts, 2));
    let mut cp = CheckpointStore::load(dir.path().join("cp_par.json")).unwrap();
    let stats = engine.sync_symbol_parallel("ES", &mut cp).await.unwrap();

    assert_eq!(stats.inserted, 5);
    assert_eq!(
        sequential_sink.rows("es_ticks"),
        parallel_sink.rows("es_ticks")
    );
}
