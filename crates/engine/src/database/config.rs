//! Database configuration via `docstore.toml`
//!
//! [`Database::open_dir`](super::Database::open_dir) writes a default
//! `docstore.toml` into the data directory on first open. To change settings,
//! edit the file and reopen.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use docstore_core::{Error, Result};
use docstore_storage::options::{DEFAULT_MAX_BATCH_DELAY, DEFAULT_MAX_BATCH_SIZE};
use docstore_storage::StoreOptions;

use crate::codec::JSON_CODEC;
use crate::key::DEFAULT_KEY_LEN;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "docstore.toml";

/// Storage engine settings, the `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Calls coalesced into one batch commit at most (default: 1000)
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Milliseconds a batch leader waits for more calls (default: 10)
    #[serde(default = "default_max_batch_delay_ms")]
    pub max_batch_delay_ms: u64,
    /// fsync the data file on every commit (default: true)
    #[serde(default = "default_true")]
    pub sync_on_commit: bool,
}

fn default_max_batch_size() -> usize {
    DEFAULT_MAX_BATCH_SIZE
}

fn default_max_batch_delay_ms() -> u64 {
    DEFAULT_MAX_BATCH_DELAY.as_millis() as u64
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_batch_delay_ms: default_max_batch_delay_ms(),
            sync_on_commit: true,
        }
    }
}

/// Database configuration loaded from `docstore.toml`.
///
/// # Example
///
/// ```toml
/// key_len = 16
/// default_codec = "json"
///
/// [storage]
/// max_batch_size = 1000
/// max_batch_delay_ms = 10
/// sync_on_commit = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocstoreConfig {
    /// Document key length for new collections.
    #[serde(default = "default_key_len")]
    pub key_len: usize,
    /// Codec for new collections.
    #[serde(default = "default_codec")]
    pub default_codec: String,
    /// Storage engine settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_key_len() -> usize {
    DEFAULT_KEY_LEN
}

fn default_codec() -> String {
    JSON_CODEC.to_string()
}

impl Default for DocstoreConfig {
    fn default() -> Self {
        Self {
            key_len: default_key_len(),
            default_codec: default_codec(),
            storage: StorageConfig::default(),
        }
    }
}

impl DocstoreConfig {
    /// Check the values are usable.
    ///
    /// # Errors
    ///
    /// `Config` for a zero key length, an empty codec name or a zero batch
    /// size.
    pub fn validate(&self) -> Result<()> {
        if self.key_len == 0 {
            return Err(Error::Config("key_len must be at least 1".to_string()));
        }
        if self.default_codec.is_empty() {
            return Err(Error::Config("default_codec must not be empty".to_string()));
        }
        if self.storage.max_batch_size == 0 {
            return Err(Error::Config(
                "storage.max_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Storage options derived from the `[storage]` section.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_max_batch_size(self.storage.max_batch_size)
            .with_max_batch_delay(Duration::from_millis(self.storage.max_batch_delay_ms))
            .with_sync_on_commit(self.storage.sync_on_commit)
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# docstore database configuration
#
# Length in bytes of document keys in new collections (default: 16, a UUIDv7)
key_len = 16

# Codec used by new collections unless one is named (default: "json")
default_codec = "json"

[storage]
# A pending batch commits once it holds this many calls
max_batch_size = 1000
# ...or once its leader has waited this many milliseconds
max_batch_delay_ms = 10
# fsync the data file before a commit becomes visible
sync_on_commit = true
"#
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DocstoreConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
