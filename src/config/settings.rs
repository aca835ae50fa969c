//! Application settings
//!
//! Settings are layered from a config directory (default + RUN_MODE +
//! local overrides) and `SCID_SYNC__`-prefixed environment variables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Database configuration
    pub database: DatabaseSettings,
    /// Batch/queue sizing
    #[serde(default)]
    pub storage: StorageSettings,
    /// Path to the checkpoint file
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
    /// Configured symbols, keyed by symbol name (ES, NQ, ...)
    #[serde(default)]
    pub symbols: BTreeMap<String, SymbolSettings>,
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,
}

/// Batch and hand-off queue sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Rows per database batch insert
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches buffered between the decode and load halves of the pipeline
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_batch_size() -> usize {
    10_000
}

fn default_queue_depth() -> usize {
    3
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoint.json")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// Per-symbol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSettings {
    /// Destination table name
    pub table_name: String,
    /// Multiplier applied to prices at resample time (1.0 = no-op)
    #[serde(default = "default_price_multiplier")]
    pub price_multiplier: f64,
    /// Contract files in chronological rollover order
    #[serde(default)]
    pub contracts: Vec<ContractSettings>,
}

fn default_price_multiplier() -> f64 {
    1.0
}

/// One contract file with its rollover window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractSettings {
    /// Path to the SCID file
    pub file: PathBuf,
    /// First date to load (inclusive)
    pub start_date: Option<NaiveDate>,
    /// First date of the successor contract (exclusive); open-ended if unset
    pub end_date: Option<NaiveDate>,
}

impl ContractSettings {
    /// Inclusive start instant of the contract window.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start_date
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
    }

    /// Exclusive end instant of the contract window.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
    }
}

impl Settings {
    /// Load settings from configuration files and environment
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir =
            std::env::var("SCID_SYNC_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let s = Config::builder()
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            .add_source(File::with_name(&format!("{}/local", config_dir)).required(false))
            // Environment variables, e.g. SCID_SYNC__DATABASE__URL
            .add_source(
                Environment::with_prefix("SCID_SYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Get the configuration for one symbol.
    pub fn symbol(&self, name: &str) -> Option<&SymbolSettings> {
        self.symbols.get(name)
    }

    /// All configured symbol names.
    pub fn all_symbols(&self) -> Vec<String> {
        self.symbols.keys().cloned().collect()
    }

    /// Create default settings (useful for testing)
    pub fn default_settings() -> Self {
        Settings {
            database: DatabaseSettings {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/future_index".into()),
            },
            storage: StorageSettings::default(),
            checkpoint_path: default_checkpoint_path(),
            symbols: BTreeMap::new(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default_settings();
        assert_eq!(settings.storage.batch_size, 10_000);
        assert_eq!(settings.storage.queue_depth, 3);
        assert!(settings.symbols.is_empty());
    }

    #[test]
    fn test_contract_window_bounds() {
        let contract = ContractSettings {
            file: PathBuf::from("ESZ24_FUT_CME.scid"),
            start_date: Some(NaiveDate::from_ymd_opt(2024, 9, 15).unwrap()),
            end_date: None,
        };
        let start = contract.start().unwrap();
        assert_eq!(start.to_rfc3339(), "2024-09-15T00:00:00+00:00");
        assert!(contract.end().is_none());
    }

    #[test]
    fn test_symbol_deserialization() {
        let json = r#"{
            "table_name": "ES",
            "contracts": [
                {"file": "ESZ24_FUT_CME.scid", "start_date": "2024-09-15", "end_date": "2024-12-20"},
                {"file": "ESH25_FUT_CME.scid", "start_date": "2024-12-20", "end_date": null}
            ]
        }"#;
        let sym: SymbolSettings = serde_json::from_str(json).unwrap();
        assert_eq!(sym.table_name, "ES");
        assert_eq!(sym.price_multiplier, 1.0);
        assert_eq!(sym.contracts.len(), 2);
        assert!(sym.contracts[1].end_date.is_none());
    }
}
