// rust/checkpoint-state/src/checkpoint/writer.rs

//! Checkpoint directory writer.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::CheckpointConfig;
use crate::error::{CheckpointError, Result};
use crate::state::CheckpointState;
use crate::storage::StorageBackend;

use super::format::{
    self, sibling, BlobEntry, CheckpointManifest, ParameterEntry, MANIFEST_FILE, OPTIMIZER_FILE,
    PARAMETERS_DIR,
};

/// Writes a [`CheckpointState`] as a checkpoint directory.
///
/// The `CheckpointWriter` handles:
/// - Compressing data files with the configured algorithm (none, lz4, zstd)
/// - Recording XXHash64 checksums in the manifest
/// - Atomic commits: everything is written to a hidden staging directory
///   that replaces the destination by rename
pub struct CheckpointWriter {
    storage: Arc<dyn StorageBackend>,
    config: CheckpointConfig,
}

impl CheckpointWriter {
    pub fn new(storage: Arc<dyn StorageBackend>, config: CheckpointConfig) -> Self {
        Self { storage, config }
    }

    /// Saves `state` to the directory `dest`.
    ///
    /// The optimizer blob is written only if `include_optimizer_state` is
    /// true and the state has one. On error the previous contents of `dest`
    /// (if any) are left in place and no partial checkpoint is visible there.
    pub fn write(
        &self,
        state: &CheckpointState,
        dest: &Path,
        include_optimizer_state: bool,
    ) -> Result<()> {
        self.config.validate()?;

        let name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CheckpointError::invalid_argument(format!(
                    "checkpoint path '{}' has no directory name",
                    dest.display()
                ))
            })?;

        if self.storage.exists(dest)? && !self.storage.metadata(dest)?.is_dir {
            return Err(CheckpointError::invalid_argument(format!(
                "checkpoint path '{}' exists and is not a directory",
                dest.display()
            )));
        }

        self.recover_interrupted(dest, name)?;

        let suffix = unique_suffix();
        let staging = sibling(dest, &format!("{}{suffix}", format::staging_prefix(name)));
        let backup = sibling(dest, &format!("{}{suffix}", format::backup_prefix(name)));

        let staged = self
            .storage
            .create_dir_all(&staging)
            .and_then(|()| self.write_contents(state, &staging, include_optimizer_state))
            .and_then(|manifest| {
                self.commit(&staging, dest, &backup)?;
                Ok(manifest)
            });

        match staged {
            Ok(manifest) => {
                tracing::info!(
                    path = %dest.display(),
                    properties = manifest.properties.len(),
                    parameters = manifest.parameters.len(),
                    optimizer_state = manifest.optimizer.is_some(),
                    compression = %manifest.compression,
                    "saved checkpoint"
                );
                Ok(())
            }
            Err(e) => {
                self.discard(&staging);
                Err(e)
            }
        }
    }

    /// Writes data files and the manifest into `dir`. The manifest goes
    /// last so a directory without one is never mistaken for a checkpoint.
    fn write_contents(
        &self,
        state: &CheckpointState,
        dir: &Path,
        include_optimizer_state: bool,
    ) -> Result<CheckpointManifest> {
        let mut manifest = CheckpointManifest::new(self.config.compression.clone());

        manifest.properties = state
            .properties()
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        for (index, (name, tensor)) in state.parameters().iter().enumerate() {
            let file = format!("{PARAMETERS_DIR}/{index}.bin");
            let blob = self.write_blob(dir, file, tensor.data())?;
            manifest.parameters.push(ParameterEntry {
                name: name.to_string(),
                element_type: tensor.element_type(),
                shape: tensor.shape().clone(),
                blob,
            });
        }

        if include_optimizer_state {
            match state.optimizer_state() {
                Some(blob) => {
                    manifest.optimizer = Some(self.write_blob(dir, OPTIMIZER_FILE.to_string(), blob)?);
                }
                None => {
                    tracing::debug!("optimizer state requested but none is present");
                }
            }
        }

        self.write_file(&dir.join(MANIFEST_FILE), &manifest.encode()?)?;
        Ok(manifest)
    }

    fn write_blob(&self, dir: &Path, file: String, data: &[u8]) -> Result<BlobEntry> {
        let packed = format::compress(
            data,
            &self.config.compression,
            self.config.compression_level,
        )?;
        self.write_file(&dir.join(&file), &packed)?;
        Ok(BlobEntry {
            file,
            size: data.len() as u64,
            checksum: format::checksum(data),
        })
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut writer = self.storage.open_write(path)?;
        writer.write_all(data).map_err(|e| {
            CheckpointError::storage_with_source(path, "failed to write checkpoint data", e)
        })?;
        writer.finish()?;
        tracing::debug!(path = %path.display(), bytes = data.len(), "wrote data file");
        Ok(())
    }

    /// Moves the staged directory into place.
    ///
    /// An existing checkpoint at `dest` is first renamed to `backup` and is
    /// restored if the final rename fails.
    fn commit(&self, staging: &Path, dest: &Path, backup: &Path) -> Result<()> {
        if !self.storage.exists(dest)? {
            return self.storage.rename(staging, dest);
        }

        self.storage.rename(dest, backup)?;
        if let Err(e) = self.storage.rename(staging, dest) {
            if let Err(restore) = self.storage.rename(backup, dest) {
                tracing::warn!(
                    backup = %backup.display(),
                    error = %restore,
                    "failed to restore previous checkpoint"
                );
            }
            return Err(e);
        }

        if let Err(e) = self.storage.delete(backup) {
            tracing::warn!(path = %backup.display(), error = %e, "failed to remove replaced checkpoint");
        }
        Ok(())
    }

    /// Cleans up after a save that crashed before finishing.
    ///
    /// Leftover staging directories are removed. If `dest` is missing while
    /// a backup of it exists, the crash hit between the two commit renames
    /// and the newest backup is moved back into place. Remaining backups
    /// are removed.
    fn recover_interrupted(&self, dest: &Path, name: &str) -> Result<()> {
        let parent = dest.parent().unwrap_or_else(|| Path::new(""));

        let staging_prefix = format::staging_prefix(name);
        for entry in self.storage.list(parent)? {
            if entry.starts_with(&staging_prefix) {
                let path = sibling(dest, &entry);
                tracing::warn!(path = %path.display(), "removing staging directory of an interrupted save");
                self.discard(&path);
            }
        }

        if !self.storage.exists(dest)? {
            if let Some(backup) = format::latest_backup(self.storage.as_ref(), dest)? {
                tracing::warn!(
                    backup = %backup.display(),
                    path = %dest.display(),
                    "restoring checkpoint left aside by an interrupted save"
                );
                self.storage.rename(&backup, dest)?;
            }
        }

        let backup_prefix = format::backup_prefix(name);
        for entry in self.storage.list(parent)? {
            if entry.starts_with(&backup_prefix) {
                self.discard(&sibling(dest, &entry));
            }
        }
        Ok(())
    }

    fn discard(&self, dir: &Path) {
        if let Ok(true) = self.storage.exists(dir) {
            if let Err(e) = self.storage.delete(dir) {
                tracing::warn!(path = %dir.display(), error = %e, "failed to remove directory");
            }
        }
    }
}

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{nanos}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointReader;
    use crate::config::StorageConfig;
    use crate::storage::{LocalStorage, ObjectMeta, StorageReader, StorageWriter};
    use crate::tensor::Tensor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Delegates to `LocalStorage`, failing the `n`-th write or the rename
    /// of a staging directory on request.
    struct FailingStorage {
        inner: LocalStorage,
        writes_before_failure: AtomicUsize,
        fail_staging_rename: AtomicBool,
    }

    impl FailingStorage {
        fn new(base: &Path) -> Self {
            let config = StorageConfig {
                base_path: base.to_path_buf(),
                ..Default::default()
            };
            Self {
                inner: LocalStorage::new(&config).unwrap(),
                writes_before_failure: AtomicUsize::new(usize::MAX),
                fail_staging_rename: AtomicBool::new(false),
            }
        }
    }

    impl StorageBackend for FailingStorage {
        fn exists(&self, path: &Path) -> Result<bool> {
            self.inner.exists(path)
        }

        fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
            self.inner.metadata(path)
        }

        fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
            self.inner.open_read(path)
        }

        fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
            let remaining = self.writes_before_failure.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(CheckpointError::storage(path, "injected: no space left on device"));
            }
            self.writes_before_failure.store(remaining - 1, Ordering::SeqCst);
            self.inner.open_write(path)
        }

        fn delete(&self, path: &Path) -> Result<()> {
            self.inner.delete(path)
        }

        fn list(&self, prefix: &Path) -> Result<Vec<String>> {
            self.inner.list(prefix)
        }

        fn rename(&self, from: &Path, to: &Path) -> Result<()> {
            let is_staging = from
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(".tmp-"));
            if is_staging && self.fail_staging_rename.load(Ordering::SeqCst) {
                return Err(CheckpointError::storage(from, "injected: rename failed"));
            }
            self.inner.rename(from, to)
        }

        fn create_dir_all(&self, path: &Path) -> Result<()> {
            self.inner.create_dir_all(path)
        }
    }

    fn state_with(value: f32) -> CheckpointState {
        let mut state = CheckpointState::new();
        state.add_property("step", value as i64).unwrap();
        state
            .register_parameter("w", Tensor::from_f32([2, 3], &[value; 6]).unwrap())
            .unwrap();
        state
            .register_parameter("b", Tensor::from_f32([3], &[value; 3]).unwrap())
            .unwrap();
        state.set_optimizer_state(vec![value as u8; 16]);
        state
    }

    fn setup() -> (Arc<FailingStorage>, CheckpointWriter, CheckpointReader, TempDir) {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(FailingStorage::new(temp.path()));
        let writer = CheckpointWriter::new(storage.clone(), CheckpointConfig::default());
        let reader = CheckpointReader::new(storage.clone(), true);
        (storage, writer, reader, temp)
    }

    fn hidden_entries(storage: &FailingStorage, dir: &str) -> Vec<String> {
        storage
            .list(Path::new(dir))
            .unwrap()
            .into_iter()
            .filter(|e| e.starts_with('.'))
            .collect()
    }

    #[test]
    fn test_layout() {
        let (storage, writer, _, _temp) = setup();
        writer
            .write(&state_with(1.0), Path::new("runs/ckpt"), true)
            .unwrap();

        assert_eq!(
            storage.list(Path::new("runs/ckpt")).unwrap(),
            vec![MANIFEST_FILE, OPTIMIZER_FILE, PARAMETERS_DIR]
        );
        assert_eq!(
            storage.list(Path::new("runs/ckpt/parameters")).unwrap(),
            vec!["0.bin", "1.bin"]
        );
        assert!(hidden_entries(&storage, "runs").is_empty());
    }

    #[test]
    fn test_optimizer_state_only_when_requested() {
        let (storage, writer, reader, _temp) = setup();
        writer
            .write(&state_with(1.0), Path::new("ckpt"), false)
            .unwrap();

        assert!(!storage.exists(&Path::new("ckpt").join(OPTIMIZER_FILE)).unwrap());
        assert!(reader.read(Path::new("ckpt")).unwrap().optimizer_state().is_none());
    }

    #[test]
    fn test_failed_first_save_leaves_nothing_loadable() {
        let (storage, writer, reader, _temp) = setup();
        storage.writes_before_failure.store(1, Ordering::SeqCst);

        let result = writer.write(&state_with(1.0), Path::new("ckpt"), true);
        assert!(matches!(result, Err(CheckpointError::Storage { .. })));

        assert!(!storage.exists(Path::new("ckpt")).unwrap());
        assert!(matches!(
            reader.read(Path::new("ckpt")),
            Err(CheckpointError::Storage { .. })
        ));
        assert!(hidden_entries(&storage, "").is_empty());
    }

    #[test]
    fn test_failed_overwrite_keeps_previous_checkpoint() {
        let (storage, writer, reader, _temp) = setup();
        let dest = Path::new("ckpt");
        let original = state_with(1.0);
        writer.write(&original, dest, true).unwrap();

        // Fail at each file position of the second save in turn
        for budget in 0..4 {
            storage.writes_before_failure.store(budget, Ordering::SeqCst);
            let result = writer.write(&state_with(2.0), dest, true);
            assert!(result.is_err(), "write budget {budget}");

            storage.writes_before_failure.store(usize::MAX, Ordering::SeqCst);
            assert_eq!(reader.read(dest).unwrap(), original);
        }
        assert!(hidden_entries(&storage, "").is_empty());
    }

    #[test]
    fn test_failed_commit_restores_previous_checkpoint() {
        let (storage, writer, reader, _temp) = setup();
        let dest = Path::new("ckpt");
        let original = state_with(1.0);
        writer.write(&original, dest, true).unwrap();

        storage.fail_staging_rename.store(true, Ordering::SeqCst);
        assert!(writer.write(&state_with(3.0), dest, true).is_err());
        storage.fail_staging_rename.store(false, Ordering::SeqCst);

        assert_eq!(reader.read(dest).unwrap(), original);
        assert!(hidden_entries(&storage, "").is_empty());
    }

    fn make_dir_with_file(storage: &FailingStorage, dir: &str) {
        let mut w = storage
            .open_write(&Path::new(dir).join(PARAMETERS_DIR).join("0.bin"))
            .unwrap();
        w.write_all(b"partial").unwrap();
        w.finish().unwrap();
    }

    #[test]
    fn test_save_recovers_from_crash_between_commit_renames() {
        let (storage, writer, reader, _temp) = setup();
        let dest = Path::new("ckpt");
        let original = state_with(1.0);
        writer.write(&original, dest, true).unwrap();

        // Crash after the old checkpoint was moved aside, with a staging
        // directory from an even earlier crashed save still around
        storage
            .rename(dest, Path::new(".ckpt.old-4242-1000"))
            .unwrap();
        make_dir_with_file(&storage, ".ckpt.tmp-4242-900");
        assert_eq!(reader.read(dest).unwrap(), original);

        // A failing save still puts the previous checkpoint back
        storage.writes_before_failure.store(0, Ordering::SeqCst);
        assert!(writer.write(&state_with(2.0), dest, true).is_err());
        storage.writes_before_failure.store(usize::MAX, Ordering::SeqCst);
        assert!(storage.exists(dest).unwrap());
        assert_eq!(reader.read(dest).unwrap(), original);
        assert!(hidden_entries(&storage, "").is_empty());

        let updated = state_with(2.0);
        writer.write(&updated, dest, true).unwrap();
        assert_eq!(reader.read(dest).unwrap(), updated);
    }

    #[test]
    fn test_save_removes_stale_backups() {
        let (storage, writer, reader, _temp) = setup();
        let dest = Path::new("runs/ckpt");
        writer.write(&state_with(1.0), dest, false).unwrap();
        make_dir_with_file(&storage, "runs/.ckpt.old-7-5");
        make_dir_with_file(&storage, "runs/.other.tmp-7-6");

        let updated = state_with(3.0);
        writer.write(&updated, dest, false).unwrap();

        assert_eq!(reader.read(dest).unwrap().parameters(), updated.parameters());
        // Only siblings belonging to this checkpoint are touched
        assert_eq!(hidden_entries(&storage, "runs"), vec![".other.tmp-7-6"]);
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let (storage, writer, reader, _temp) = setup();
        let dest = Path::new("ckpt");
        writer.write(&state_with(1.0), dest, true).unwrap();

        let mut smaller = CheckpointState::new();
        smaller.add_property("only", "one").unwrap();
        writer.write(&smaller, dest, true).unwrap();

        assert_eq!(reader.read(dest).unwrap(), smaller);
        assert!(!storage.exists(&dest.join(OPTIMIZER_FILE)).unwrap());
        assert!(hidden_entries(&storage, "").is_empty());
    }

    #[test]
    fn test_destination_is_a_file() {
        let (storage, writer, _, _temp) = setup();
        let mut w = storage.open_write(Path::new("plain.txt")).unwrap();
        w.write_all(b"x").unwrap();
        w.finish().unwrap();

        let result = writer.write(&CheckpointState::new(), Path::new("plain.txt"), false);
        assert!(matches!(result, Err(CheckpointError::InvalidArgument { .. })));
    }

    #[test]
    fn test_compressed_round_trip() {
        for compression in ["lz4", "zstd"] {
            let (storage, _, reader, _temp) = setup();
            let config = CheckpointConfig {
                compression: compression.to_string(),
                ..Default::default()
            };
            let writer = CheckpointWriter::new(storage.clone(), config);

            let state = state_with(4.0);
            writer.write(&state, Path::new("ckpt"), true).unwrap();

            let manifest = reader.read_manifest(Path::new("ckpt")).unwrap();
            assert_eq!(manifest.compression, compression);
            assert_eq!(reader.read(Path::new("ckpt")).unwrap(), state);
        }
    }
}
