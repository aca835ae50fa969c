//! Configuration loading

mod settings;

pub use settings::{
    ContractSettings, DatabaseSettings, Settings, StorageSettings, SymbolSettings,
};
