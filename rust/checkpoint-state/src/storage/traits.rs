// rust/checkpoint-state/src/storage/traits.rs

//! Filesystem operations the checkpoint codec depends on.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::Result;

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Size of the object in bytes.
    pub size: u64,
    /// Whether this object is a directory.
    pub is_dir: bool,
}

/// A handle for reading a stored file.
pub trait StorageReader: Read + Send {
    /// Returns the total size of the object in bytes.
    fn size(&self) -> u64;

    /// Reads the remaining contents into a vector.
    fn read_all(&mut self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.size() as usize);
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

/// A handle for writing a stored file.
pub trait StorageWriter: Write + Send {
    /// Flushes and syncs the written data.
    ///
    /// Must be called to complete the write; dropping the writer without
    /// calling `finish` gives no durability guarantee.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Directory and file primitives used by the checkpoint codec.
///
/// `rename` must be atomic for directories on the same filesystem; the
/// codec's commit step relies on it.
///
/// This trait is object-safe and is shared as `Arc<dyn StorageBackend>`.
pub trait StorageBackend: Send + Sync {
    /// Checks if an object exists at the given path.
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Retrieves metadata for an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or metadata cannot be read.
    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    /// Opens a file for reading.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Opens a file for writing, truncating any existing file.
    ///
    /// Parent directories are created if they don't exist.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;

    /// Deletes a file, or a directory and everything below it.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Lists entry names directly under a directory, sorted.
    ///
    /// A missing directory lists as empty.
    fn list(&self, prefix: &Path) -> Result<Vec<String>>;

    /// Renames a file or directory.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Creates a directory and all parent directories.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
}
