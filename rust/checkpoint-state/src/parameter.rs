// rust/checkpoint-state/src/parameter.rs

//! Named parameter tensors.
//!
//! Retrieval is two-phase: [`ParameterStore::describe`] returns the element
//! type and shape so the caller can allocate, then [`ParameterStore::get`]
//! or [`ParameterStore::get_into`] copies the stored bytes out. The store
//! never hands out references to its own buffers.

use std::collections::BTreeMap;

use crate::error::{CheckpointError, Result};
use crate::tensor::{Tensor, TensorDescriptor, Value};

/// Parameter name to tensor mapping.
///
/// Element type and shape are fixed when a parameter is registered; only
/// the bytes can change afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    params: BTreeMap<String, Tensor>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new parameter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `name` is empty or already registered.
    pub fn register(&mut self, name: impl Into<String>, tensor: Tensor) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(CheckpointError::invalid_argument(
                "parameter name must not be empty",
            ));
        }
        if self.params.contains_key(&name) {
            return Err(CheckpointError::invalid_argument(format!(
                "parameter '{name}' is already registered"
            )));
        }
        self.params.insert(name, tensor);
        Ok(())
    }

    /// Returns the element type and shape of a parameter.
    pub fn describe(&self, name: &str) -> Result<TensorDescriptor> {
        self.lookup(name).map(|t| t.descriptor().clone())
    }

    /// Returns a copy of a parameter.
    pub fn get(&self, name: &str) -> Result<Tensor> {
        self.lookup(name).cloned()
    }

    /// Copies a parameter into a caller-allocated tensor.
    ///
    /// A destination whose element type or shape differ from the stored
    /// descriptor fails with `TypeMismatch` and is left untouched.
    pub fn get_into(&self, name: &str, dest: &mut Tensor) -> Result<()> {
        let stored = self.lookup(name)?;
        let (expected, actual) = (stored.descriptor(), dest.descriptor());
        if expected != actual {
            return Err(CheckpointError::type_mismatch(
                name,
                format!("{} {}", expected.element_type, expected.shape),
                format!("{} {}", actual.element_type, actual.shape),
            ));
        }
        dest.data_mut().copy_from_slice(stored.data());
        Ok(())
    }

    /// Replaces the bytes of an existing parameter.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no parameter has this name
    /// - `InvalidArgument` if `value` is not a dense tensor
    /// - `TypeMismatch` / `ShapeMismatch` if the descriptor differs
    ///
    /// Stored bytes are unchanged on error.
    pub fn update(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let stored = self
            .params
            .get_mut(name)
            .ok_or_else(|| CheckpointError::parameter_not_found(name))?;
        let tensor = value.into().into_tensor()?;
        stored.descriptor().ensure_matches(name, tensor.descriptor())?;
        *stored = tensor;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    /// Borrowing iterator for the codec; not exposed outside the crate.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn lookup(&self, name: &str) -> Result<&Tensor> {
        self.params
            .get(name)
            .ok_or_else(|| CheckpointError::parameter_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyValue;
    use crate::tensor::ElementType;

    fn store_with_w() -> ParameterStore {
        let mut store = ParameterStore::new();
        let w = Tensor::from_f32([2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        store.register("w", w).unwrap();
        store
    }

    #[test]
    fn test_describe() {
        let store = store_with_w();
        let desc = store.describe("w").unwrap();
        assert_eq!(desc.element_type, ElementType::Float32);
        assert_eq!(desc.shape.dims(), &[2, 3]);

        assert!(store.describe("b").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_returns_independent_copy() {
        let store = store_with_w();
        let mut copy = store.get("w").unwrap();
        copy.data_mut().fill(0);

        let again = store.get("w").unwrap();
        assert_eq!(again.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_get_into_two_phase() {
        let store = store_with_w();
        let desc = store.describe("w").unwrap();
        let mut dest = Tensor::zeros(desc).unwrap();
        store.get_into("w", &mut dest).unwrap();
        assert_eq!(dest, store.get("w").unwrap());
    }

    #[test]
    fn test_get_into_rejects_wrong_destination() {
        let store = store_with_w();

        let mut wrong_type =
            Tensor::zeros(TensorDescriptor::new(ElementType::Int32, [2, 3])).unwrap();
        assert!(matches!(
            store.get_into("w", &mut wrong_type),
            Err(CheckpointError::TypeMismatch { .. })
        ));
        assert!(wrong_type.data().iter().all(|&b| b == 0));

        // A wrong destination shape is a type mismatch for the buffer too
        let mut wrong_shape =
            Tensor::zeros(TensorDescriptor::new(ElementType::Float32, [3, 2])).unwrap();
        match store.get_into("w", &mut wrong_shape) {
            Err(CheckpointError::TypeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, "float32 [2, 3]");
                assert_eq!(actual, "float32 [3, 2]");
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
        assert!(wrong_shape.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_update_replaces_bytes() {
        let mut store = store_with_w();
        let new_w = Tensor::from_f32([2, 3], &[0.5; 6]).unwrap();
        store.update("w", new_w).unwrap();
        assert_eq!(store.get("w").unwrap().to_f32_vec().unwrap(), vec![0.5; 6]);
    }

    #[test]
    fn test_rejected_update_leaves_bytes_intact() {
        let mut store = store_with_w();
        let before = store.get("w").unwrap();

        let transposed = Tensor::from_f32([3, 2], &[9.0; 6]).unwrap();
        assert!(matches!(
            store.update("w", transposed),
            Err(CheckpointError::ShapeMismatch { .. })
        ));

        let ints = Tensor::from_i64([2, 3], &[1; 6]).unwrap();
        assert!(matches!(
            store.update("w", ints),
            Err(CheckpointError::TypeMismatch { .. })
        ));

        assert!(matches!(
            store.update("w", Value::Property(PropertyValue::Float(1.0))),
            Err(CheckpointError::InvalidArgument { .. })
        ));

        assert_eq!(store.get("w").unwrap().data(), before.data());
    }

    #[test]
    fn test_update_missing_parameter() {
        let mut store = ParameterStore::new();
        let t = Tensor::from_f32([1], &[1.0]).unwrap();
        assert!(store.update("missing", t).unwrap_err().is_not_found());
    }

    #[test]
    fn test_register_duplicate() {
        let mut store = store_with_w();
        let other = Tensor::from_f32([1], &[1.0]).unwrap();
        assert!(matches!(
            store.register("w", other),
            Err(CheckpointError::InvalidArgument { .. })
        ));
        assert_eq!(store.describe("w").unwrap().shape.dims(), &[2, 3]);
    }
}
