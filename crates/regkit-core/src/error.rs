//! Error types for the core data structures.
//!
//! Parameter parsing, image construction and transform parameter handling all
//! report through [`CoreError`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// A parameter file could not be tokenized.
    #[error("Syntax error in parameter text at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A parameter value could not be converted to the requested type.
    #[error("Parameter \"{key}\" entry {entry}: cannot interpret \"{value}\" ({reason})")]
    InvalidValue {
        key: String,
        entry: usize,
        value: String,
        reason: String,
    },

    /// Unknown pixel type name.
    #[error("Unknown pixel type: {0}")]
    UnknownPixelType(String),

    /// Dimension of some input does not match the expected dimension.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Number of voxels does not match the image size.
    #[error("Voxel count mismatch: size implies {expected}, got {actual}")]
    VoxelCount { expected: usize, actual: usize },

    /// Wrong number of transform parameters.
    #[error("Transform expects {expected} parameters, got {actual}")]
    ParameterCount { expected: usize, actual: usize },

    /// Input admits no meaningful result (e.g. zero total mass).
    #[error("Degenerate input: {0}")]
    Degenerate(String),

    /// Reading or writing a text file failed.
    #[error("I/O error for {path}: {message}")]
    FileIo { path: PathBuf, message: String },

    /// Reading or writing an image failed.
    #[error("Image I/O error for {path}: {message}")]
    ImageIo { path: PathBuf, message: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an image I/O error.
    pub fn image_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ImageIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a file I/O error.
    pub fn file_io(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileIo {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(
        key: impl Into<String>,
        entry: usize,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            key: key.into(),
            entry,
            value: value.into(),
            reason: reason.into(),
        }
    }
}
