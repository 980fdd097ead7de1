// rust/checkpoint-state/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

use crate::tensor::{ElementType, Shape};

#[derive(Error, Debug)]
pub enum CheckpointError {

    #[error("{kind} '{name}' not found")]
    NotFound {
        kind: &'static str,
        name: String,
    },

    #[error("type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("shape mismatch for '{name}': expected {expected}, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: Shape,
        actual: Shape,
    },

    #[error("Checkpoint format error: {message}")]
    Format {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("checkpoint state has been released")]
    UseAfterRelease,

    #[error("checkpoint state has not been loaded")]
    NotLoaded,

    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

// Convenience constructors
impl CheckpointError {

    pub fn property_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "property",
            name: name.into(),
        }
    }

    pub fn parameter_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "parameter",
            name: name.into(),
        }
    }

    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn element_type_mismatch(
        name: impl Into<String>,
        expected: ElementType,
        actual: ElementType,
    ) -> Self {
        Self::type_mismatch(name, expected, actual)
    }

    pub fn shape_mismatch(name: impl Into<String>, expected: Shape, actual: Shape) -> Self {
        Self::ShapeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
            source: None,
        }
    }

    pub fn format_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Format {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true for the `NotFound` variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
