//! Persistent configuration for key layout, distribution and scan limits.
//!
//! Stored as `trace_store.json` in a config directory. A missing file means
//! "use defaults"; callers decide whether to write one back.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::{KeyDistributor, RowKeyLayout};

pub const CONFIG_FILE_NAME: &str = "trace_store.json";

/// Salt bucket parameters for `KeyDistributor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorConfig {
    pub hash_start: usize,
    pub hash_end: usize,
    pub max_buckets: usize,
    pub secondary_modulus: usize,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            hash_start: 0,
            hash_end: 24,
            max_buckets: 32,
            secondary_modulus: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Cost budget for one bounded read.
    pub default_limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { default_limit: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraceStoreConfig {
    #[serde(default)]
    pub distributor: DistributorConfig,
    #[serde(default)]
    pub row_key: RowKeyLayout,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl TraceStoreConfig {
    /// Read config from `dir`, or `None` if the file doesn't exist.
    pub fn read_from(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(CONFIG_FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Rejects combinations the codecs would refuse at construction.
    pub fn validate(&self) -> Result<()> {
        self.row_key.validate()?;
        KeyDistributor::from_config(&self.distributor)?;
        Ok(())
    }
}
