use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hkv_archive::{ArchiveConfig, SyncMode};

use crate::error::{StoreError, StoreResult};

/// Size in bytes of an encoded identifier key.
pub const IDENTIFIER_KEY_SIZE: usize = 16;

/// Which kind of logical key a store is opened for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyKind {
    /// Text keys, encoded as UTF-16LE.
    String,
    /// 128-bit identifiers.
    Identifier,
    /// Pre-hashed keys handled directly through the key store.
    Raw,
}

/// Configuration for a key store and the façades over it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest encoded key, in bytes, the façades accept. `None` means no
    /// limit: keys are hashed before indexing, so their length never reaches
    /// the index.
    pub max_key_size: Option<u32>,
    /// When `false`, string keys are lowercased before hashing.
    pub case_sensitive: bool,
    /// Seconds between background index snapshots.
    pub snapshot_interval_secs: u64,
    /// Durability of archive appends.
    pub sync: SyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_key_size: None,
            case_sensitive: false,
            snapshot_interval_secs: 60,
            sync: SyncMode::OsDefault,
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::ConfigParse(e.to_string()))
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check that a store for `kind` keys can honor this configuration.
    pub fn validate(&self, kind: KeyKind) -> StoreResult<()> {
        if self.snapshot_interval_secs == 0 {
            return Err(StoreError::InvalidConfig(
                "snapshot_interval_secs must be at least 1".into(),
            ));
        }
        match self.key_size_limit() {
            Some(0) => Err(StoreError::InvalidConfig(
                "max_key_size must be at least 1".into(),
            )),
            Some(max) if kind == KeyKind::Identifier && max < IDENTIFIER_KEY_SIZE => {
                Err(StoreError::InvalidConfig(format!(
                    "identifier keys are {IDENTIFIER_KEY_SIZE} bytes but max_key_size is {max}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Key size limit in bytes, if one is configured.
    pub fn key_size_limit(&self) -> Option<usize> {
        self.max_key_size
            .map(|max| usize::try_from(max).unwrap_or(usize::MAX))
    }

    /// Interval between background index snapshots.
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn archive_config(&self) -> ArchiveConfig {
        ArchiveConfig {
            sync_mode: self.sync,
        }
    }
}
