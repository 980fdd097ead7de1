// rust/checkpoint-state/src/storage/mod.rs

//! Storage abstraction for checkpoint directories.
//!
//! The codec talks to the filesystem only through [`StorageBackend`], so
//! tests can substitute a backend that fails on demand.
//!
//! # Example
//!
//! ```no_run
//! use checkpoint_state::config::StorageConfig;
//! use checkpoint_state::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//!
//! let mut writer = storage.open_write(Path::new("example.bin")).unwrap();
//! writer.write_all(b"bytes").unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = storage.open_read(Path::new("example.bin")).unwrap();
//! let content = reader.read_all().unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
