// rust/checkpoint-state/src/config.rs

//! Configuration for the checkpoint store.
//!
//! Configuration is read from TOML, optionally overridden by `CKPT_*`
//! environment variables, and validated before use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CheckpointError, Result};

/// Compression algorithms accepted for checkpoint data files.
pub const COMPRESSION_ALGORITHMS: [&str; 3] = ["none", "lz4", "zstd"];

// Serializes tests that mutate `CKPT_*` environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

// Top-level store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage: StorageConfig,
    pub checkpoint: CheckpointConfig,
}

// Local storage options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path that relative checkpoint paths resolve against.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
    // Whether to memory-map large data files when reading.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

/// Checkpoint encoding options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Compression for parameter and optimizer files: "none", "lz4", or "zstd".
    pub compression: String,
    /// Compression level (zstd only).
    pub compression_level: i32,
    /// Verify XXHash64 checksums of data files on load.
    pub verify_checksums: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            compression: "none".to_string(),
            compression_level: 3,
            verify_checksums: true,
        }
    }
}

impl FromStr for StoreConfig {
    type Err = CheckpointError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| CheckpointError::config_with_source("failed to parse TOML config", e))
    }
}

impl StoreConfig {
    // Load and validate configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CheckpointError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply `CKPT_*` environment variable overrides. Values that fail to
    // parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("CKPT_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("CKPT_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("CKPT_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("CKPT_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        if let Ok(val) = std::env::var("CKPT_CHECKPOINT_COMPRESSION") {
            self.checkpoint.compression = val;
        }
        if let Ok(val) = std::env::var("CKPT_CHECKPOINT_COMPRESSION_LEVEL") {
            if let Ok(v) = val.parse() {
                self.checkpoint.compression_level = v;
            }
        }
        if let Ok(val) = std::env::var("CKPT_CHECKPOINT_VERIFY_CHECKSUMS") {
            if let Ok(v) = val.parse() {
                self.checkpoint.verify_checksums = v;
            }
        }

        self
    }

    // Validate all configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(CheckpointError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }
        self.checkpoint.validate()
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> Result<()> {
        if !COMPRESSION_ALGORITHMS.contains(&self.compression.as_str()) {
            return Err(CheckpointError::config(format!(
                "checkpoint.compression must be one of: {}",
                COMPRESSION_ALGORITHMS.join(", ")
            )));
        }
        if self.compression == "zstd" && !(1..=22).contains(&self.compression_level) {
            return Err(CheckpointError::config(
                "checkpoint.compression_level must be between 1 and 22 for zstd",
            ));
        }
        Ok(())
    }
}
