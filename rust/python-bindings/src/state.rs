// rust/python-bindings/src/state.rs

//! Python bindings for the checkpoint state handle.

#![allow(clippy::useless_conversion)]

use checkpoint_state::{CheckpointHandle, PropertyValue, Value};
use pyo3::exceptions::PyTypeError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyFloat, PyLong, PyString};

use crate::tensor::PyTensor;
use crate::WrappedError;

/// The state of a training run loaded from a checkpoint directory.
///
/// Holds parameter tensors, typed run properties and optional optimizer
/// state. Item access looks up a property first, then a parameter.
///
/// Examples
/// --------
/// >>> state = CheckpointState.load_checkpoint("checkpoints/latest")
/// >>> state["epoch"] = 11
/// >>> w = state["fc.weight"]
/// >>> CheckpointState.save_checkpoint(state, "checkpoints/latest", True)
#[pyclass(name = "CheckpointState")]
pub struct PyCheckpointState {
    handle: CheckpointHandle,
}

#[pymethods]
impl PyCheckpointState {
    /// Load a checkpoint directory.
    ///
    /// Parameters
    /// ----------
    /// path : str
    ///     Path of the checkpoint directory
    /// config_path : str, optional
    ///     Path to a TOML configuration file. ``CKPT_*`` environment
    ///     variables override it either way.
    ///
    /// Returns
    /// -------
    /// CheckpointState
    ///
    /// Raises
    /// ------
    /// IOError
    ///     If the directory or one of its files cannot be read
    /// RuntimeError
    ///     If the checkpoint contents are malformed
    #[staticmethod]
    #[pyo3(signature = (path, config_path=None))]
    fn load_checkpoint(py: Python<'_>, path: &str, config_path: Option<&str>) -> PyResult<Self> {
        let handle = py
            .allow_threads(|| match config_path {
                Some(config_path) => {
                    CheckpointHandle::load_checkpoint_with_config_file(path, config_path)
                }
                None => CheckpointHandle::load_checkpoint(path),
            })
            .map_err(WrappedError)?;
        Ok(Self { handle })
    }

    /// Save a state to a checkpoint directory, replacing it atomically.
    ///
    /// Parameters
    /// ----------
    /// state : CheckpointState
    ///     State to save
    /// path : str
    ///     Destination directory
    /// include_optimizer_state : bool
    ///     Whether to persist the optimizer state (default: False)
    #[staticmethod]
    #[pyo3(signature = (state, path, include_optimizer_state=false))]
    fn save_checkpoint(
        py: Python<'_>,
        state: PyRef<'_, Self>,
        path: &str,
        include_optimizer_state: bool,
    ) -> PyResult<()> {
        let handle = &state.handle;
        py.allow_threads(|| handle.save_checkpoint(path, include_optimizer_state))
            .map_err(WrappedError)?;
        Ok(())
    }

    /// Add or overwrite a property.
    fn add_property(&mut self, name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = extract_property(value)?;
        self.handle
            .add_property(name, value)
            .map_err(WrappedError)?;
        Ok(())
    }

    /// Get a property value as int, float or str.
    ///
    /// Raises
    /// ------
    /// KeyError
    ///     If no property has this name
    fn get_property(&self, py: Python<'_>, name: &str) -> PyResult<PyObject> {
        let value = self.handle.get_property(name).map_err(WrappedError)?;
        Ok(property_to_py(py, value))
    }

    fn has_property(&self, name: &str) -> PyResult<bool> {
        Ok(self.handle.has_property(name).map_err(WrappedError)?)
    }

    fn has_parameter(&self, name: &str) -> PyResult<bool> {
        Ok(self.handle.has_parameter(name).map_err(WrappedError)?)
    }

    /// Describe a parameter without copying its data.
    ///
    /// Returns
    /// -------
    /// tuple[str, list[int]]
    ///     Element type name and shape
    fn describe_parameter(&self, name: &str) -> PyResult<(String, Vec<usize>)> {
        let desc = self.handle.describe_parameter(name).map_err(WrappedError)?;
        Ok((desc.element_type.name().to_string(), desc.shape.dims().to_vec()))
    }

    /// Copy a parameter out of the state.
    fn get_parameter(&self, name: &str) -> PyResult<PyTensor> {
        let tensor = self.handle.get_parameter(name).map_err(WrappedError)?;
        Ok(PyTensor::from(tensor))
    }

    /// Overwrite a parameter's data.
    ///
    /// Raises
    /// ------
    /// KeyError
    ///     If no parameter has this name
    /// ValueError
    ///     If the element type or shape differs from the stored parameter
    fn update_parameter(&mut self, name: &str, tensor: PyRef<'_, PyTensor>) -> PyResult<()> {
        let tensor = tensor.to_tensor()?;
        self.handle
            .update_parameter(name, tensor)
            .map_err(WrappedError)?;
        Ok(())
    }

    /// Release the state. Further access raises RuntimeError.
    fn release(&mut self) {
        self.handle.release();
    }

    fn __contains__(&self, name: &str) -> PyResult<bool> {
        Ok(self.handle.contains(name).map_err(WrappedError)?)
    }

    fn __getitem__(&self, py: Python<'_>, name: &str) -> PyResult<PyObject> {
        match self.handle.get(name).map_err(WrappedError)? {
            Value::Property(value) => Ok(property_to_py(py, value)),
            Value::Tensor(tensor) => Ok(Py::new(py, PyTensor::from(tensor))?.into_py(py)),
            Value::Sequence(_) => Err(PyTypeError::new_err(
                "sequence values are not exposed to Python",
            )),
        }
    }

    /// Overwrite a property if `name` is one, else update a parameter if
    /// `name` is one, otherwise add a property.
    fn __setitem__(&mut self, name: &str, value: &Bound<'_, PyAny>) -> PyResult<()> {
        let value = extract_value(value)?;
        self.handle.set(name, value).map_err(WrappedError)?;
        Ok(())
    }

    fn __repr__(&self) -> String {
        format!("CheckpointState(state={:?})", self.handle.lifecycle())
    }
}

fn property_to_py(py: Python<'_>, value: PropertyValue) -> PyObject {
    match value {
        PropertyValue::Int(v) => v.into_py(py),
        PropertyValue::Float(v) => f64::from(v).into_py(py),
        PropertyValue::String(v) => v.into_py(py),
    }
}

/// Extracts a property from a Python int, float or str.
///
/// Python floats are narrowed to 32 bits.
fn extract_property(ob: &Bound<'_, PyAny>) -> PyResult<PropertyValue> {
    if ob.is_instance_of::<PyBool>() {
        return Err(PyTypeError::new_err(
            "property values must be int, float or str, not bool",
        ));
    }
    if ob.is_instance_of::<PyLong>() {
        return Ok(PropertyValue::Int(ob.extract::<i64>()?));
    }
    if ob.is_instance_of::<PyFloat>() {
        return Ok(PropertyValue::Float(ob.extract::<f64>()? as f32));
    }
    if ob.is_instance_of::<PyString>() {
        return Ok(PropertyValue::String(ob.extract::<String>()?));
    }
    Err(PyTypeError::new_err(format!(
        "property values must be int, float or str, got {}",
        ob.get_type().name()?
    )))
}

fn extract_value(ob: &Bound<'_, PyAny>) -> PyResult<Value> {
    if let Ok(tensor) = ob.downcast::<PyTensor>() {
        return Ok(Value::Tensor(tensor.borrow().to_tensor()?));
    }
    extract_property(ob).map(Value::Property)
}
