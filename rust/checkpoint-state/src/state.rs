// rust/checkpoint-state/src/state.rs

//! The full mutable state of a training run.

use crate::error::{CheckpointError, Result};
use crate::parameter::ParameterStore;
use crate::property::{PropertyBag, PropertyValue};
use crate::tensor::{Tensor, TensorDescriptor, Value};

/// Properties, parameters and an opaque optimizer blob.
///
/// A `CheckpointState` is plain owned data. Lifecycle rules (release,
/// use-after-release) live on [`crate::CheckpointHandle`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointState {
    properties: PropertyBag,
    parameters: ParameterStore,
    optimizer_state: Option<Vec<u8>>,
}

impl CheckpointState {
    /// Creates an empty state for a new checkpoint.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(
        properties: PropertyBag,
        parameters: ParameterStore,
        optimizer_state: Option<Vec<u8>>,
    ) -> Self {
        Self {
            properties,
            parameters,
            optimizer_state,
        }
    }

    pub fn properties(&self) -> &PropertyBag {
        &self.properties
    }

    pub fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn add_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        self.properties.add(name, value)
    }

    pub fn get_property(&self, name: &str) -> Result<PropertyValue> {
        self.properties.get(name).cloned()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    pub fn register_parameter(&mut self, name: impl Into<String>, tensor: Tensor) -> Result<()> {
        self.parameters.register(name, tensor)
    }

    pub fn describe_parameter(&self, name: &str) -> Result<TensorDescriptor> {
        self.parameters.describe(name)
    }

    pub fn get_parameter(&self, name: &str) -> Result<Tensor> {
        self.parameters.get(name)
    }

    pub fn get_parameter_into(&self, name: &str, dest: &mut Tensor) -> Result<()> {
        self.parameters.get_into(name, dest)
    }

    pub fn update_parameter(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.parameters.update(name, value)
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains(name)
    }

    /// True if `name` is a property or a parameter.
    pub fn contains(&self, name: &str) -> bool {
        self.has_property(name) || self.has_parameter(name)
    }

    /// Looks up a property, then a parameter, by name.
    pub fn get(&self, name: &str) -> Result<Value> {
        if let Ok(value) = self.properties.get(name) {
            return Ok(Value::Property(value.clone()));
        }
        if self.parameters.contains(name) {
            return self.parameters.get(name).map(Value::Tensor);
        }
        Err(CheckpointError::NotFound {
            kind: "property or parameter",
            name: name.to_string(),
        })
    }

    /// Resolves `name` in the same order as [`get`](Self::get): an existing
    /// property is overwritten, then an existing parameter is updated,
    /// otherwise a new property is added.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if !self.properties.contains(name) && self.parameters.contains(name) {
            self.parameters.update(name, value)
        } else {
            self.properties.add(name, value.into_property()?)
        }
    }

    pub fn optimizer_state(&self) -> Option<&[u8]> {
        self.optimizer_state.as_deref()
    }

    pub fn set_optimizer_state(&mut self, blob: Vec<u8>) {
        self.optimizer_state = Some(blob);
    }

    pub fn clear_optimizer_state(&mut self) -> Option<Vec<u8>> {
        self.optimizer_state.take()
    }
}
