// rust/checkpoint-state/src/lib.rs

//! Checkpoint State Store - Core Library
//!
//! Holds the mutable state of a training run (parameter tensors, an opaque
//! optimizer blob and typed run properties) and persists it to, or restores
//! it from, a checkpoint directory.
//!
//! # Example
//!
//! ```no_run
//! use checkpoint_state::{CheckpointHandle, Tensor};
//!
//! let mut handle = CheckpointHandle::load_checkpoint("checkpoints/latest").unwrap();
//!
//! // Two-phase parameter access: describe, allocate, copy
//! let desc = handle.describe_parameter("fc.weight").unwrap();
//! let mut weights = Tensor::zeros(desc).unwrap();
//! handle.get_parameter_into("fc.weight", &mut weights).unwrap();
//!
//! handle.update_parameter("fc.weight", weights).unwrap();
//! handle.add_property("epoch", 11i64).unwrap();
//! handle.save_checkpoint("checkpoints/latest", true).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod storage;

pub use config::StoreConfig;
pub use error::{CheckpointError, Result};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader, StorageWriter};

pub mod property;
pub mod tensor;
pub use property::{PropertyBag, PropertyValue};
pub use tensor::{ElementType, Shape, Tensor, TensorDescriptor, Value};

pub mod parameter;
pub mod state;
pub use parameter::ParameterStore;
pub use state::CheckpointState;

pub mod checkpoint;
pub use checkpoint::{CheckpointManifest, DirectoryCodec};

pub mod handle;
pub use handle::{CheckpointHandle, HandleState};
