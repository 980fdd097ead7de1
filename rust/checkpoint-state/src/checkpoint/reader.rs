// rust/checkpoint-state/src/checkpoint/reader.rs

//! Checkpoint directory reader.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::error::{CheckpointError, Result};
use crate::parameter::ParameterStore;
use crate::property::PropertyBag;
use crate::state::CheckpointState;
use crate::storage::StorageBackend;
use crate::tensor::Tensor;

use super::format::{self, BlobEntry, CheckpointManifest, MANIFEST_FILE};

/// Reads checkpoint directories back into a [`CheckpointState`].
///
/// The `CheckpointReader` handles:
/// - Validating the manifest magic and layout version
/// - Rejecting duplicate parameter or property names
/// - Decompressing data files and verifying their checksums
pub struct CheckpointReader {
    storage: Arc<dyn StorageBackend>,
    verify_checksums: bool,
}

impl CheckpointReader {
    pub fn new(storage: Arc<dyn StorageBackend>, verify_checksums: bool) -> Self {
        Self {
            storage,
            verify_checksums,
        }
    }

    /// Loads a full checkpoint.
    ///
    /// # Errors
    ///
    /// - `Storage` if the manifest or a referenced data file is missing or
    ///   unreadable
    /// - `Format` if the manifest is corrupt, has the wrong version, lists a
    ///   name twice, or a data file has the wrong size or checksum
    pub fn read(&self, dir: &Path) -> Result<CheckpointState> {
        let dir = self.locate(dir)?;
        let dir = dir.as_path();
        let manifest = self.decode_manifest(dir)?;

        let mut seen = HashSet::with_capacity(manifest.parameters.len());
        for entry in &manifest.parameters {
            if entry.name.is_empty() {
                return Err(CheckpointError::format("empty parameter name in manifest"));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(CheckpointError::format(format!(
                    "duplicate parameter '{}' in manifest",
                    entry.name
                )));
            }
        }

        let mut parameters = ParameterStore::new();
        for entry in &manifest.parameters {
            let expected = entry.descriptor().byte_len().map_err(|e| {
                CheckpointError::format_with_source(
                    format!("invalid descriptor for parameter '{}'", entry.name),
                    e,
                )
            })?;
            if entry.blob.size != expected as u64 {
                return Err(CheckpointError::format(format!(
                    "parameter '{}' records {} bytes, descriptor {} {} needs {expected}",
                    entry.name, entry.blob.size, entry.element_type, entry.shape
                )));
            }

            let data = self.read_blob(dir, &entry.blob, &manifest.compression)?;
            let tensor = Tensor::from_bytes(entry.element_type, entry.shape.clone(), data)
                .map_err(|e| {
                    CheckpointError::format_with_source(
                        format!("corrupt data for parameter '{}'", entry.name),
                        e,
                    )
                })?;
            parameters.register(entry.name.clone(), tensor)?;
        }

        let optimizer_state = match &manifest.optimizer {
            Some(blob) => Some(self.read_blob(dir, blob, &manifest.compression)?),
            None => None,
        };

        let properties = PropertyBag::from_entries(manifest.properties)?;

        tracing::info!(
            path = %dir.display(),
            properties = properties.len(),
            parameters = parameters.len(),
            optimizer_state = optimizer_state.is_some(),
            "loaded checkpoint"
        );

        Ok(CheckpointState::from_parts(
            properties,
            parameters,
            optimizer_state,
        ))
    }

    /// Reads and validates only the manifest of a checkpoint.
    pub fn read_manifest(&self, dir: &Path) -> Result<CheckpointManifest> {
        self.decode_manifest(&self.locate(dir)?)
    }

    /// Falls back to the newest backup of `dir` when a save crashed after
    /// moving the previous checkpoint aside but before committing its own.
    fn locate(&self, dir: &Path) -> Result<PathBuf> {
        if self.storage.exists(dir)? {
            return Ok(dir.to_path_buf());
        }
        match format::latest_backup(self.storage.as_ref(), dir)? {
            Some(backup) => {
                tracing::warn!(
                    path = %dir.display(),
                    backup = %backup.display(),
                    "checkpoint missing, reading backup left by an interrupted save"
                );
                Ok(backup)
            }
            None => Ok(dir.to_path_buf()),
        }
    }

    fn decode_manifest(&self, dir: &Path) -> Result<CheckpointManifest> {
        let path = dir.join(MANIFEST_FILE);
        let mut reader = self.storage.open_read(&path)?;
        let bytes = reader.read_all().map_err(|e| {
            CheckpointError::storage_with_source(&path, "failed to read manifest", e)
        })?;
        CheckpointManifest::decode(&bytes)
    }

    fn read_blob(&self, dir: &Path, blob: &BlobEntry, compression: &str) -> Result<Vec<u8>> {
        let path = resolve_blob_path(dir, &blob.file)?;
        let mut reader = self.storage.open_read(&path)?;
        let raw = reader.read_all().map_err(|e| {
            CheckpointError::storage_with_source(&path, "failed to read data file", e)
        })?;
        tracing::debug!(path = %path.display(), bytes = raw.len(), "read data file");

        let data = format::decompress(raw, compression, blob.size)?;

        if data.len() as u64 != blob.size {
            return Err(CheckpointError::format(format!(
                "size mismatch in {}: expected {}, got {}",
                blob.file,
                blob.size,
                data.len()
            )));
        }

        if self.verify_checksums {
            let computed = format::checksum(&data);
            if computed != blob.checksum {
                return Err(CheckpointError::format(format!(
                    "checksum mismatch in {}: expected {}, got {computed}",
                    blob.file, blob.checksum
                )));
            }
        }

        Ok(data)
    }
}

/// Joins a manifest-relative file name onto the checkpoint directory,
/// refusing names that would escape it.
fn resolve_blob_path(dir: &Path, file: &str) -> Result<PathBuf> {
    let rel = Path::new(file);
    let contained = !file.is_empty()
        && rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !contained {
        return Err(CheckpointError::format(format!(
            "data file '{file}' is outside the checkpoint directory"
        )));
    }
    Ok(dir.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::format::{ParameterEntry, PARAMETERS_DIR};
    use crate::checkpoint::CheckpointWriter;
    use crate::config::{CheckpointConfig, StorageConfig};
    use crate::property::PropertyValue;
    use crate::storage::LocalStorage;
    use crate::tensor::{ElementType, Shape};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_setup() -> (
        CheckpointWriter,
        CheckpointReader,
        Arc<dyn StorageBackend>,
        TempDir,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let storage_config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new(&storage_config).unwrap());

        let writer = CheckpointWriter::new(storage.clone(), CheckpointConfig::default());
        let reader = CheckpointReader::new(storage.clone(), true);
        (writer, reader, storage, temp_dir)
    }

    fn sample_state() -> CheckpointState {
        let mut state = CheckpointState::new();
        state.add_property("epoch", 2i64).unwrap();
        state
            .register_parameter("w", Tensor::from_f32([2, 3], &[0.5; 6]).unwrap())
            .unwrap();
        state
    }

    fn write_manifest(storage: &Arc<dyn StorageBackend>, dir: &Path, manifest: &CheckpointManifest) {
        let mut w = storage.open_write(&dir.join(MANIFEST_FILE)).unwrap();
        w.write_all(&manifest.encode().unwrap()).unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn test_missing_directory_is_storage_error() {
        let (_, reader, _, _temp) = create_test_setup();
        let result = reader.read(Path::new("does-not-exist"));
        assert!(matches!(result, Err(CheckpointError::Storage { .. })));
    }

    #[test]
    fn test_reads_backup_of_interrupted_commit() {
        let (writer, reader, storage, _temp) = create_test_setup();
        let state = sample_state();
        writer.write(&state, Path::new("runs/ckpt"), false).unwrap();

        storage
            .rename(Path::new("runs/ckpt"), Path::new("runs/.ckpt.old-31-200"))
            .unwrap();
        writer.write(&CheckpointState::new(), Path::new("runs/other"), false).unwrap();

        assert_eq!(reader.read(Path::new("runs/ckpt")).unwrap(), state);
        assert_eq!(
            reader.read_manifest(Path::new("runs/ckpt")).unwrap().parameters.len(),
            1
        );
        assert!(matches!(
            reader.read(Path::new("runs/missing")),
            Err(CheckpointError::Storage { .. })
        ));
    }

    #[test]
    fn test_missing_parameter_file_is_storage_error() {
        let (writer, reader, storage, _temp) = create_test_setup();
        let dir = Path::new("ckpt");
        writer.write(&sample_state(), dir, false).unwrap();

        storage.delete(&dir.join(PARAMETERS_DIR).join("0.bin")).unwrap();
        assert!(matches!(reader.read(dir), Err(CheckpointError::Storage { .. })));
    }

    #[test]
    fn test_corrupt_parameter_file_fails_checksum() {
        let (writer, reader, storage, temp) = create_test_setup();
        let dir = Path::new("ckpt");
        writer.write(&sample_state(), dir, false).unwrap();

        let file = temp.path().join("ckpt").join(PARAMETERS_DIR).join("0.bin");
        let mut bytes = std::fs::read(&file).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(&file, &bytes).unwrap();

        let err = reader.read(dir).unwrap_err();
        assert!(matches!(err, CheckpointError::Format { .. }));
        assert!(err.to_string().contains("checksum"));

        // Without verification the flipped bytes load as-is
        let lenient = CheckpointReader::new(storage, false);
        let state = lenient.read(dir).unwrap();
        assert_eq!(state.get_parameter("w").unwrap().data()[0], bytes[0]);
    }

    #[test]
    fn test_duplicate_parameter_is_format_error() {
        let (writer, reader, storage, _temp) = create_test_setup();
        let dir = Path::new("ckpt");
        writer.write(&sample_state(), dir, false).unwrap();

        let mut manifest = reader.read_manifest(dir).unwrap();
        let dup = manifest.parameters[0].clone();
        manifest.parameters.push(dup);
        write_manifest(&storage, dir, &manifest);

        let err = reader.read(dir).unwrap_err();
        assert!(err.to_string().contains("duplicate parameter"));
    }

    #[test]
    fn test_duplicate_property_is_format_error() {
        let (writer, reader, storage, _temp) = create_test_setup();
        let dir = Path::new("ckpt");
        writer.write(&sample_state(), dir, false).unwrap();

        let mut manifest = reader.read_manifest(dir).unwrap();
        manifest
            .properties
            .push(("epoch".to_string(), PropertyValue::Int(9)));
        write_manifest(&storage, dir, &manifest);

        assert!(matches!(reader.read(dir), Err(CheckpointError::Format { .. })));
    }

    #[test]
    fn test_descriptor_size_disagreement_is_format_error() {
        let (writer, reader, storage, _temp) = create_test_setup();
        let dir = Path::new("ckpt");
        writer.write(&sample_state(), dir, false).unwrap();

        let mut manifest = reader.read_manifest(dir).unwrap();
        manifest.parameters[0].shape = Shape::from([4, 4]);
        write_manifest(&storage, dir, &manifest);

        assert!(matches!(reader.read(dir), Err(CheckpointError::Format { .. })));
    }

    #[test]
    fn test_escaping_file_name_rejected() {
        let (_, reader, storage, _temp) = create_test_setup();
        let dir = Path::new("ckpt");

        let mut manifest = CheckpointManifest::new("none");
        manifest.parameters.push(ParameterEntry {
            name: "w".to_string(),
            element_type: ElementType::UInt8,
            shape: Shape::from([1]),
            blob: BlobEntry {
                file: "../outside.bin".to_string(),
                size: 1,
                checksum: 0,
            },
        });
        write_manifest(&storage, dir, &manifest);

        let err = reader.read(dir).unwrap_err();
        assert!(err.to_string().contains("outside the checkpoint directory"));
    }

    #[test]
    fn test_garbage_manifest_is_format_error() {
        let (_, reader, storage, _temp) = create_test_setup();
        let mut w = storage.open_write(Path::new("ckpt/manifest.bin")).unwrap();
        w.write_all(b"not a manifest at all").unwrap();
        w.finish().unwrap();

        assert!(matches!(
            reader.read(Path::new("ckpt")),
            Err(CheckpointError::Format { .. })
        ));
    }
}
