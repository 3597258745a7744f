//! Row store configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Where rows live
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// RocksDB directory. In-memory store when unset.
    pub path: Option<PathBuf>,

    /// fsync every write
    #[serde(default)]
    pub sync_writes: bool,
}
