// rust/checkpoint-state/src/property.rs

//! Typed run properties (epoch, step, best score, ...).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};

/// A property value: 64-bit signed integer, 32-bit float or UTF-8 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Float(f32),
    String(String),
}

impl PropertyValue {
    /// Name of the tag, used in type mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Bit-exact equality: floats compare by their bit pattern, so NaN
    /// payloads and signed zeros are distinguished.
    pub fn bit_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Property name to value mapping, iterated in name order.
///
/// Inserting an existing name overwrites the previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites a property.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `name` is empty.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(CheckpointError::invalid_argument(
                "property name must not be empty",
            ));
        }
        self.entries.insert(name, value.into());
        Ok(())
    }

    /// Returns the value last written under `name`.
    pub fn get(&self, name: &str) -> Result<&PropertyValue> {
        self.entries
            .get(name)
            .ok_or_else(|| CheckpointError::property_not_found(name))
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        let value = self.get(name)?;
        value
            .as_int()
            .ok_or_else(|| CheckpointError::type_mismatch(name, "int", value.type_name()))
    }

    pub fn get_float(&self, name: &str) -> Result<f32> {
        let value = self.get(name)?;
        value
            .as_float()
            .ok_or_else(|| CheckpointError::type_mismatch(name, "float", value.type_name()))
    }

    pub fn get_string(&self, name: &str) -> Result<&str> {
        let value = self.get(name)?;
        value
            .as_str()
            .ok_or_else(|| CheckpointError::type_mismatch(name, "string", value.type_name()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds a bag from decoded entries, rejecting duplicate or empty names.
    pub(crate) fn from_entries(
        entries: impl IntoIterator<Item = (String, PropertyValue)>,
    ) -> Result<Self> {
        let mut bag = Self::new();
        for (name, value) in entries {
            if name.is_empty() {
                return Err(CheckpointError::format("empty property name in manifest"));
            }
            if bag.entries.insert(name.clone(), value).is_some() {
                return Err(CheckpointError::format(format!(
                    "duplicate property '{name}' in manifest"
                )));
            }
        }
        Ok(bag)
    }
}
