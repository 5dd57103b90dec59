use std::fs;
use std::path::{Path, PathBuf};

use certledger_history::{HistoryLog, InMemoryHistoryLog, JournalHistoryLog};
use certledger_store::{InMemoryRecordStore, JournalRecordStore, RecordStore, SyncMode};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RegistryResult;
use crate::locks::DEFAULT_STRIPES;
use crate::registry::Registry;

/// File name of the record journal inside `data_dir`.
pub const RECORDS_FILE: &str = "records.journal";
/// File name of the history journal inside `data_dir`.
pub const HISTORY_FILE: &str = "history.journal";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Registry configuration, normally read from a TOML file.
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    pub storage: StorageConfig,
    pub registry: PolicyConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Journal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding the journal files; unused by the memory backend.
    pub data_dir: PathBuf,
    pub sync: SyncMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./certledger-data"),
            sync: SyncMode::OsDefault,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Run [`Registry::seed`] right after opening.
    pub seed_on_open: bool,
    pub lock_stripes: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            seed_on_open: false,
            lock_stripes: DEFAULT_STRIPES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl RegistryConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.lock_stripes == 0 {
            return Err(ConfigError::Invalid(
                "registry.lock_stripes must be at least 1".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".into()));
        }
        Ok(())
    }

    /// Use the journal backend rooted at `dir`.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.backend = StorageBackend::Journal;
        self.storage.data_dir = dir.into();
        self
    }
}

/// Registry over whichever backends the config selects.
pub type DynRegistry = Registry<Box<dyn RecordStore>, Box<dyn HistoryLog>>;

/// Build the registry described by `config`, seeding it if asked to.
pub fn open_registry(config: &RegistryConfig) -> RegistryResult<DynRegistry> {
    config.validate()?;

    let (store, history): (Box<dyn RecordStore>, Box<dyn HistoryLog>) =
        match config.storage.backend {
            StorageBackend::Memory => (
                Box::new(InMemoryRecordStore::new()),
                Box::new(InMemoryHistoryLog::new()),
            ),
            StorageBackend::Journal => {
                let dir = &config.storage.data_dir;
                let sync = config.storage.sync;
                (
                    Box::new(JournalRecordStore::open(&dir.join(RECORDS_FILE), sync)?),
                    Box::new(JournalHistoryLog::open(&dir.join(HISTORY_FILE), sync)?),
                )
            }
        };

    let registry = Registry::new(store, history).with_lock_stripes(config.registry.lock_stripes);
    info!(
        backend = ?config.storage.backend,
        data_dir = %config.storage.data_dir.display(),
        "registry opened"
    );

    if config.registry.seed_on_open {
        registry.seed()?;
    }
    Ok(registry)
}
