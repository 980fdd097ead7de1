// rust/checkpoint-state/src/tensor.rs

//! Tensor value types exchanged with the training session.
//!
//! A [`Tensor`] is an opaque typed buffer: an element type, a shape and the
//! raw little-endian bytes. The store never interprets the bytes beyond
//! checking that their length matches the descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CheckpointError, Result};
use crate::property::PropertyValue;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Float32,
    Float64,
    Float16,
    BFloat16,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
}

impl ElementType {
    /// Size of a single element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 | Self::Bool => 1,
            Self::Float16 | Self::BFloat16 | Self::Int16 | Self::UInt16 => 2,
            Self::Float32 | Self::Int32 | Self::UInt32 => 4,
            Self::Float64 | Self::Int64 | Self::UInt64 => 8,
        }
    }

    /// Lowercase name, e.g. `"float32"`.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Float16 => "float16",
            Self::BFloat16 => "bfloat16",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Bool => "bool",
        }
    }

    /// Parses a name produced by [`ElementType::name`].
    pub fn from_name(name: &str) -> Result<Self> {
        let ty = match name {
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "float16" => Self::Float16,
            "bfloat16" => Self::BFloat16,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "bool" => Self::Bool,
            _ => {
                return Err(CheckpointError::invalid_argument(format!(
                    "unknown element type: {name}"
                )))
            }
        };
        Ok(ty)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered dimension sizes of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Number of elements, or `None` on overflow. A rank-0 shape holds one element.
    pub fn num_elements(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Self(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Element type and shape of a tensor, without its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub element_type: ElementType,
    pub shape: Shape,
}

impl TensorDescriptor {
    pub fn new(element_type: ElementType, shape: impl Into<Shape>) -> Self {
        Self {
            element_type,
            shape: shape.into(),
        }
    }

    /// Byte length of a dense buffer for this descriptor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the size overflows `usize`.
    pub fn byte_len(&self) -> Result<usize> {
        self.shape
            .num_elements()
            .and_then(|n| n.checked_mul(self.element_type.size()))
            .ok_or_else(|| {
                CheckpointError::invalid_argument(format!(
                    "tensor of shape {} and type {} is too large",
                    self.shape, self.element_type
                ))
            })
    }

    /// Checks that `other` has the same element type and shape.
    ///
    /// Element type is compared first, so a tensor that differs in both
    /// reports a type mismatch.
    pub fn ensure_matches(&self, name: &str, other: &TensorDescriptor) -> Result<()> {
        if self.element_type != other.element_type {
            return Err(CheckpointError::element_type_mismatch(
                name,
                self.element_type,
                other.element_type,
            ));
        }
        if self.shape != other.shape {
            return Err(CheckpointError::shape_mismatch(
                name,
                self.shape.clone(),
                other.shape.clone(),
            ));
        }
        Ok(())
    }
}

/// A dense tensor: descriptor plus owned bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    descriptor: TensorDescriptor,
    data: Vec<u8>,
}

impl Tensor {
    /// Creates a tensor from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `data.len()` does not equal the byte
    /// length implied by the element type and shape.
    pub fn from_bytes(
        element_type: ElementType,
        shape: impl Into<Shape>,
        data: Vec<u8>,
    ) -> Result<Self> {
        let descriptor = TensorDescriptor::new(element_type, shape);
        let expected = descriptor.byte_len()?;
        if data.len() != expected {
            return Err(CheckpointError::invalid_argument(format!(
                "tensor data is {} bytes, expected {expected} for {} {}",
                data.len(),
                descriptor.element_type,
                descriptor.shape
            )));
        }
        Ok(Self { descriptor, data })
    }

    /// Allocates a zero-filled tensor for `descriptor`.
    pub fn zeros(descriptor: TensorDescriptor) -> Result<Self> {
        let len = descriptor.byte_len()?;
        Ok(Self {
            descriptor,
            data: vec![0u8; len],
        })
    }

    /// Creates a float32 tensor from values.
    pub fn from_f32(shape: impl Into<Shape>, values: &[f32]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(ElementType::Float32, shape, data)
    }

    /// Creates an int64 tensor from values.
    pub fn from_i64(shape: impl Into<Shape>, values: &[i64]) -> Result<Self> {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(ElementType::Int64, shape, data)
    }

    /// Decodes the data as float32 values.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the tensor is not float32.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if self.descriptor.element_type != ElementType::Float32 {
            return Err(CheckpointError::element_type_mismatch(
                "<tensor>",
                ElementType::Float32,
                self.descriptor.element_type,
            ));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    pub fn element_type(&self) -> ElementType {
        self.descriptor.element_type
    }

    pub fn shape(&self) -> &Shape {
        &self.descriptor.shape
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable view of the bytes. The length is fixed by the descriptor.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// A value handed across the session boundary.
///
/// Only [`Value::Tensor`] is accepted where a parameter is expected; the
/// other categories exist so callers holding a generic value get a typed
/// `InvalidArgument` rather than a silent reinterpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A dense tensor.
    Tensor(Tensor),
    /// A property scalar or string.
    Property(PropertyValue),
    /// A sequence of values.
    Sequence(Vec<Value>),
}

impl Value {
    /// Short name of the value category, used in error messages.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Tensor(_) => "tensor",
            Self::Property(_) => "property",
            Self::Sequence(_) => "sequence",
        }
    }

    /// Returns the tensor, or `InvalidArgument` for any other category.
    pub fn into_tensor(self) -> Result<Tensor> {
        match self {
            Self::Tensor(t) => Ok(t),
            other => Err(CheckpointError::invalid_argument(format!(
                "expected a dense tensor, got a {}",
                other.category()
            ))),
        }
    }

    /// Returns the property value, or `InvalidArgument` for any other category.
    pub fn into_property(self) -> Result<PropertyValue> {
        match self {
            Self::Property(p) => Ok(p),
            other => Err(CheckpointError::invalid_argument(format!(
                "expected a property value, got a {}",
                other.category()
            ))),
        }
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<PropertyValue> for Value {
    fn from(p: PropertyValue) -> Self {
        Self::Property(p)
    }
}
