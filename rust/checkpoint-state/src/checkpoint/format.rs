// rust/checkpoint-state/src/checkpoint/format.rs

//! Checkpoint directory layout and manifest.
//!
//! ```text
//! <checkpoint>/
//!   manifest.bin         u32 LE manifest length + bincode(CheckpointManifest)
//!   parameters/<i>.bin   bytes of the i-th parameter, compressed per manifest
//!   optimizer.bin        optimizer blob, only when saved with optimizer state
//! ```
//!
//! A save stages into the hidden sibling `.<checkpoint>.tmp-<pid>-<nanos>`.
//! While it commits, a checkpoint being replaced sits at
//! `.<checkpoint>.old-<pid>-<nanos>`.

use std::hash::Hasher;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{CheckpointError, Result};
use crate::property::PropertyValue;
use crate::storage::StorageBackend;
use crate::tensor::{ElementType, Shape, TensorDescriptor};

pub(crate) const MANIFEST_FILE: &str = "manifest.bin";
pub(crate) const PARAMETERS_DIR: &str = "parameters";
pub(crate) const OPTIMIZER_FILE: &str = "optimizer.bin";

pub(crate) fn staging_prefix(name: &str) -> String {
    format!(".{name}.tmp-")
}

pub(crate) fn backup_prefix(name: &str) -> String {
    format!(".{name}.old-")
}

/// `name` in the same parent directory as `dest`.
pub(crate) fn sibling(dest: &Path, name: &str) -> PathBuf {
    match dest.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Finds the newest backup of `dest` left by a save that did not finish
/// committing.
pub(crate) fn latest_backup(
    storage: &dyn StorageBackend,
    dest: &Path,
) -> Result<Option<PathBuf>> {
    let Some(name) = dest.file_name().and_then(|n| n.to_str()) else {
        return Ok(None);
    };
    let prefix = backup_prefix(name);
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));

    let latest = storage
        .list(parent)?
        .into_iter()
        .filter_map(|entry| {
            let nanos = entry
                .strip_prefix(&prefix)?
                .rsplit('-')
                .next()?
                .parse::<u128>()
                .ok()?;
            Some((nanos, entry))
        })
        .max_by_key(|(nanos, _)| *nanos);

    Ok(latest.map(|(_, entry)| sibling(dest, &entry)))
}

/// A data file referenced from the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    /// Path relative to the checkpoint directory.
    pub file: String,
    /// Size of the data before compression.
    pub size: u64,
    /// XXHash64 checksum of the uncompressed data.
    pub checksum: u64,
}

/// Descriptor and data file of one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    pub element_type: ElementType,
    pub shape: Shape,
    pub blob: BlobEntry,
}

impl ParameterEntry {
    pub fn descriptor(&self) -> TensorDescriptor {
        TensorDescriptor::new(self.element_type, self.shape.clone())
    }
}

/// Self-describing index of a checkpoint directory.
///
/// Properties are stored inline; tensor data lives in separate files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    /// Magic bytes identifying a checkpoint manifest ("CKST")
    pub magic: [u8; 4],
    /// Layout version number
    pub version: u32,
    /// Compression applied to data files ("none", "lz4", or "zstd")
    pub compression: String,
    pub properties: Vec<(String, PropertyValue)>,
    pub parameters: Vec<ParameterEntry>,
    pub optimizer: Option<BlobEntry>,
}

impl CheckpointManifest {
    pub const MAGIC: [u8; 4] = *b"CKST";

    /// Current layout version. No other version is readable.
    pub const VERSION: u32 = 1;

    pub fn new(compression: impl Into<String>) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            compression: compression.into(),
            properties: Vec::new(),
            parameters: Vec::new(),
            optimizer: None,
        }
    }

    pub fn validate_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    pub fn validate_version(&self) -> bool {
        self.version == Self::VERSION
    }

    /// Serializes as a length-prefixed bincode record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| CheckpointError::format_with_source("failed to serialize manifest", e))?;
        let len = u32::try_from(body.len())
            .map_err(|_| CheckpointError::format("manifest exceeds 4 GiB"))?;

        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Parses a manifest and checks magic and version.
    ///
    /// Any undecodable content, including an unknown property or element
    /// type tag, is a `Format` error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let len_bytes: [u8; 4] = bytes
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| CheckpointError::format("manifest too small"))?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        let body = bytes
            .get(4..)
            .filter(|b| b.len() == len)
            .ok_or_else(|| {
                CheckpointError::format(format!(
                    "manifest length mismatch: header says {len}, file has {}",
                    bytes.len().saturating_sub(4)
                ))
            })?;

        let manifest: Self = bincode::deserialize(body)
            .map_err(|e| CheckpointError::format_with_source("failed to deserialize manifest", e))?;

        if !manifest.validate_magic() {
            return Err(CheckpointError::format(format!(
                "invalid magic bytes: expected {:?}, got {:?}",
                Self::MAGIC,
                manifest.magic
            )));
        }
        if !manifest.validate_version() {
            return Err(CheckpointError::format(format!(
                "unsupported version: expected {}, got {}",
                Self::VERSION,
                manifest.version
            )));
        }
        Ok(manifest)
    }
}

/// XXHash64 (seed 0) of `data`.
pub(crate) fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

pub(crate) fn compress(data: &[u8], compression: &str, level: i32) -> Result<Vec<u8>> {
    match compression {
        "none" => Ok(data.to_vec()),
        "lz4" => Ok(lz4_flex::compress_prepend_size(data)),
        "zstd" => zstd::encode_all(data, level)
            .map_err(|e| CheckpointError::format_with_source("zstd compression failed", e)),
        _ => Err(CheckpointError::config(format!(
            "unknown compression algorithm: {compression}"
        ))),
    }
}

/// Decompresses a data file whose manifest records `size` bytes.
///
/// Output is capped at `size`, so a corrupt file fails as a `Format` error
/// instead of allocating whatever its header claims.
pub(crate) fn decompress(data: Vec<u8>, compression: &str, size: u64) -> Result<Vec<u8>> {
    let size = usize::try_from(size)
        .map_err(|_| CheckpointError::format(format!("recorded size {size} is too large")))?;
    match compression {
        "none" => Ok(data),
        "lz4" => {
            if data.len() < 4 {
                return Err(CheckpointError::format("lz4 data is missing its size prefix"));
            }
            let (prefix, block) = data.split_at(4);
            let prefixed = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
            if prefixed != size {
                return Err(CheckpointError::format(format!(
                    "lz4 data claims {prefixed} bytes, manifest records {size}"
                )));
            }
            lz4_flex::decompress(block, size)
                .map_err(|e| CheckpointError::format_with_source("lz4 decompression failed", e))
        }
        "zstd" => zstd::bulk::decompress(&data, size)
            .map_err(|e| CheckpointError::format_with_source("zstd decompression failed", e)),
        _ => Err(CheckpointError::format(format!(
            "unknown compression algorithm: {compression}"
        ))),
    }
}
