// rust/python-bindings/src/lib.rs

//! Python bindings for the checkpoint state store.
//!
//! This module exposes checkpoint loading, saving and property/parameter
//! access to Python using PyO3.

use checkpoint_state::CheckpointError;
use pyo3::exceptions::{PyIOError, PyKeyError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

mod state;
mod tensor;

pub use state::PyCheckpointState;
pub use tensor::PyTensor;

/// Wrapper for CheckpointError to enable conversion to PyErr.
///
/// Both CheckpointError and PyErr are foreign to this crate, so the
/// conversion goes through a local newtype.
pub struct WrappedError(pub CheckpointError);

impl From<CheckpointError> for WrappedError {
    fn from(err: CheckpointError) -> Self {
        WrappedError(err)
    }
}

impl From<WrappedError> for PyErr {
    fn from(err: WrappedError) -> PyErr {
        let message = err.0.to_string();
        match err.0 {
            CheckpointError::NotFound { .. } => PyKeyError::new_err(message),
            CheckpointError::TypeMismatch { .. }
            | CheckpointError::ShapeMismatch { .. }
            | CheckpointError::InvalidArgument { .. }
            | CheckpointError::Config { .. } => PyValueError::new_err(message),
            CheckpointError::Storage { .. } => PyIOError::new_err(message),
            CheckpointError::Format { .. }
            | CheckpointError::UseAfterRelease
            | CheckpointError::NotLoaded => PyRuntimeError::new_err(message),
        }
    }
}

/// The Python extension module.
///
/// This module provides:
/// - `CheckpointState`: loads, holds and saves the state of a training run
/// - `Tensor`: element type, shape and raw bytes of a parameter
#[pymodule]
fn _checkpoint_state(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCheckpointState>()?;
    m.add_class::<PyTensor>()?;
    Ok(())
}
