// rust/checkpoint-state/src/handle.rs

//! Lifecycle-tracked owner of a [`CheckpointState`].
//!
//! A handle moves through `Uninitialized -> Loaded -> Released`. Every
//! operation on a released handle fails with `UseAfterRelease`; on an
//! uninitialized one with `NotLoaded`. Dropping a handle releases it.
//!
//! A training session borrows the state through [`CheckpointHandle::state`]
//! or [`CheckpointHandle::state_mut`], so the handle cannot be released or
//! dropped while the session holds it.

use std::path::Path;
use std::sync::Arc;

use crate::checkpoint::DirectoryCodec;
use crate::config::StoreConfig;
use crate::error::{CheckpointError, Result};
use crate::property::PropertyValue;
use crate::state::CheckpointState;
use crate::tensor::{Tensor, TensorDescriptor, Value};

/// Observable lifecycle state of a [`CheckpointHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Uninitialized,
    Loaded,
    Released,
}

enum Slot {
    Uninitialized,
    Loaded(Box<CheckpointState>),
    Released,
}

/// Owns a checkpoint state and the codec used to persist it.
pub struct CheckpointHandle {
    slot: Slot,
    codec: Arc<DirectoryCodec>,
}

impl CheckpointHandle {
    /// Creates an uninitialized handle bound to `codec`.
    pub fn new(codec: Arc<DirectoryCodec>) -> Self {
        Self {
            slot: Slot::Uninitialized,
            codec,
        }
    }

    /// Loads a checkpoint from the local filesystem with default settings
    /// and `CKPT_*` environment overrides applied.
    pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_checkpoint_with_config(path, &StoreConfig::default().with_env_overrides())
    }

    /// Loads a checkpoint using settings from a TOML configuration file.
    ///
    /// Environment variable overrides are applied after loading the file.
    pub fn load_checkpoint_with_config_file(
        path: impl AsRef<Path>,
        config_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let config = StoreConfig::from_file(config_path)?.with_env_overrides();
        Self::load_checkpoint_with_config(path, &config)
    }

    /// Loads a checkpoint from the local filesystem.
    ///
    /// The handle keeps the codec, so later saves use the same compression
    /// and storage settings.
    pub fn load_checkpoint_with_config(
        path: impl AsRef<Path>,
        config: &StoreConfig,
    ) -> Result<Self> {
        let codec = Arc::new(DirectoryCodec::local(config)?);
        let mut handle = Self::new(codec);
        handle.load(path)?;
        Ok(handle)
    }

    /// Wraps an in-memory state, e.g. the first checkpoint of a fresh run.
    pub fn from_state(state: CheckpointState, codec: Arc<DirectoryCodec>) -> Self {
        Self {
            slot: Slot::Loaded(Box::new(state)),
            codec,
        }
    }

    /// Loads `path` into an uninitialized handle.
    ///
    /// On error the handle stays uninitialized.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        match self.slot {
            Slot::Uninitialized => {}
            Slot::Loaded(_) => {
                return Err(CheckpointError::invalid_argument(
                    "checkpoint handle is already loaded",
                ))
            }
            Slot::Released => return Err(CheckpointError::UseAfterRelease),
        }
        let state = self.codec.load(path)?;
        self.slot = Slot::Loaded(Box::new(state));
        Ok(())
    }

    pub fn lifecycle(&self) -> HandleState {
        match self.slot {
            Slot::Uninitialized => HandleState::Uninitialized,
            Slot::Loaded(_) => HandleState::Loaded,
            Slot::Released => HandleState::Released,
        }
    }

    pub fn state(&self) -> Result<&CheckpointState> {
        match &self.slot {
            Slot::Loaded(state) => Ok(&**state),
            Slot::Uninitialized => Err(CheckpointError::NotLoaded),
            Slot::Released => Err(CheckpointError::UseAfterRelease),
        }
    }

    pub fn state_mut(&mut self) -> Result<&mut CheckpointState> {
        match &mut self.slot {
            Slot::Loaded(state) => Ok(&mut **state),
            Slot::Uninitialized => Err(CheckpointError::NotLoaded),
            Slot::Released => Err(CheckpointError::UseAfterRelease),
        }
    }

    /// Saves the current state to `path`.
    pub fn save_checkpoint(
        &self,
        path: impl AsRef<Path>,
        include_optimizer_state: bool,
    ) -> Result<()> {
        self.codec.save(self.state()?, path, include_optimizer_state)
    }

    pub fn add_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        self.state_mut()?.add_property(name, value)
    }

    pub fn get_property(&self, name: &str) -> Result<PropertyValue> {
        self.state()?.get_property(name)
    }

    pub fn has_property(&self, name: &str) -> Result<bool> {
        Ok(self.state()?.has_property(name))
    }

    pub fn describe_parameter(&self, name: &str) -> Result<TensorDescriptor> {
        self.state()?.describe_parameter(name)
    }

    pub fn get_parameter(&self, name: &str) -> Result<Tensor> {
        self.state()?.get_parameter(name)
    }

    pub fn get_parameter_into(&self, name: &str, dest: &mut Tensor) -> Result<()> {
        self.state()?.get_parameter_into(name, dest)
    }

    pub fn update_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.state_mut()?.update_parameter(name, value)
    }

    pub fn has_parameter(&self, name: &str) -> Result<bool> {
        Ok(self.state()?.has_parameter(name))
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.state()?.contains(name))
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.state()?.get(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.state_mut()?.set(name, value)
    }

    /// Releases the state. Idempotent: releasing again is a no-op.
    ///
    /// Returns the released state the first time, `None` afterwards.
    pub fn release(&mut self) -> Option<CheckpointState> {
        match std::mem::replace(&mut self.slot, Slot::Released) {
            Slot::Loaded(state) => {
                tracing::debug!(
                    parameters = state.parameters().len(),
                    "released checkpoint state"
                );
                Some(*state)
            }
            Slot::Uninitialized | Slot::Released => None,
        }
    }
}

impl Drop for CheckpointHandle {
    fn drop(&mut self) {
        self.release();
    }
}
