// rust/python-bindings/src/tensor.rs

//! Python view of a parameter tensor.

use checkpoint_state::{ElementType, Tensor};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

use crate::WrappedError;

/// A dense tensor crossing the Python boundary as raw bytes.
///
/// Attributes
/// ----------
/// element_type : str
///     Element type name, e.g. "float32".
/// shape : list[int]
///     Dimension sizes.
/// data : bytes
///     Little-endian element data, ``prod(shape) * itemsize`` bytes.
///
/// Examples
/// --------
/// >>> import numpy as np
/// >>> w = np.zeros((2, 3), dtype=np.float32)
/// >>> t = Tensor("float32", list(w.shape), w.tobytes())
#[pyclass(name = "Tensor")]
#[derive(Clone)]
pub struct PyTensor {
    #[pyo3(get)]
    element_type: String,
    #[pyo3(get)]
    shape: Vec<usize>,
    data: Vec<u8>,
}

#[pymethods]
impl PyTensor {
    /// Create a tensor, checking that the data length matches the shape.
    ///
    /// Raises
    /// ------
    /// ValueError
    ///     If the element type is unknown or the data has the wrong length.
    #[new]
    fn new(element_type: &str, shape: Vec<usize>, data: &Bound<'_, PyBytes>) -> PyResult<Self> {
        let tensor = Tensor::from_bytes(
            ElementType::from_name(element_type).map_err(WrappedError)?,
            shape,
            data.as_bytes().to_vec(),
        )
        .map_err(WrappedError)?;
        Ok(Self::from(tensor))
    }

    #[getter]
    fn data<'py>(&self, py: Python<'py>) -> Bound<'py, PyBytes> {
        PyBytes::new_bound(py, &self.data)
    }

    fn __repr__(&self) -> String {
        format!(
            "Tensor(element_type='{}', shape={:?}, nbytes={})",
            self.element_type,
            self.shape,
            self.data.len()
        )
    }
}

impl PyTensor {
    /// Converts back into a store tensor.
    pub fn to_tensor(&self) -> PyResult<Tensor> {
        let element_type = ElementType::from_name(&self.element_type).map_err(WrappedError)?;
        let tensor = Tensor::from_bytes(element_type, self.shape.clone(), self.data.clone())
            .map_err(WrappedError)?;
        Ok(tensor)
    }
}

impl From<Tensor> for PyTensor {
    fn from(tensor: Tensor) -> Self {
        Self {
            element_type: tensor.element_type().name().to_string(),
            shape: tensor.shape().dims().to_vec(),
            data: tensor.into_bytes(),
        }
    }
}
