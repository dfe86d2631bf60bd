//! Error types for registration runs.
//!
//! Every failure of a run maps to one [`RegistrationError`] kind, and each
//! kind has its own non-zero process exit code (see
//! [`RegistrationError::error_code`]).

use std::fmt;

use regkit_core::CoreError;
use thiserror::Error;

/// A component category that could not be assembled, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFailure {
    pub category: String,
    pub reason: String,
}

impl CategoryFailure {
    pub fn new(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CategoryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.reason)
    }
}

/// A component that rejected the run while it was being validated.
#[derive(Debug)]
pub struct ComponentFailure {
    /// Component label such as `Metric1`, or `Configuration`.
    pub label: String,
    pub error: RegistrationError,
}

impl ComponentFailure {
    pub fn new(label: impl Into<String>, error: RegistrationError) -> Self {
        Self {
            label: label.into(),
            error,
        }
    }
}

impl fmt::Display for ComponentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

fn join_failures<T: fmt::Display>(failures: &[T]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Pixel types or dimensions could not be determined, disagree, or have
    /// no compiled pipeline.
    #[error("Signature resolution failed: {0}")]
    SignatureResolution(String),

    /// No factory is registered under a family name for the signature.
    #[error("Component \"{family}\" is not available for signature index {index}")]
    ComponentNotFound { family: String, index: u32 },

    /// One or more component categories failed to assemble.
    #[error("Component assembly failed: {}", join_failures(.0))]
    CategoryAssembly(Vec<CategoryFailure>),

    /// One or more components rejected the configuration in `BeforeAll`.
    #[error("Validation failed: {}", join_failures(.0))]
    Validation(Vec<ComponentFailure>),

    /// A parameter was missing or malformed.
    #[error("Parameter error: {0}")]
    Parameter(CoreError),

    /// An input image could not be read or does not fit the run.
    #[error("Image error: {0}")]
    Image(String),

    /// Writing an output artifact failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A component failed while the registration was running.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A panic escaped the pipeline.
    #[error("Unknown fatal error: {0}")]
    UnknownFatal(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl From<CoreError> for RegistrationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ImageIo { .. } | CoreError::VoxelCount { .. } | CoreError::DimensionMismatch { .. } => {
                Self::Image(err.to_string())
            }
            other => Self::Parameter(other),
        }
    }
}

impl RegistrationError {
    /// Create a signature resolution error.
    pub fn signature(msg: impl Into<String>) -> Self {
        Self::SignatureResolution(msg.into())
    }

    /// Create a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Create an image error.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::Image(msg.into())
    }

    /// Create a missing-parameter error.
    pub fn missing_parameter(key: &str) -> Self {
        Self::Parameter(CoreError::invalid_value(key, 0, "", "required parameter is missing"))
    }

    /// Process exit code for this error kind. Never 0.
    pub fn error_code(&self) -> i32 {
        match self {
            Self::SignatureResolution(_) => 2,
            Self::ComponentNotFound { .. } => 3,
            Self::CategoryAssembly(_) => 4,
            // code of the first refusal
            Self::Validation(failures) => failures.first().map_or(5, |f| f.error.error_code()),
            Self::Parameter(_) => 5,
            Self::Image(_) => 6,
            Self::Io(_) => 7,
            Self::Runtime(_) => 8,
            Self::UnknownFatal(_) => 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_distinct_and_nonzero() {
        let errors = [
            RegistrationError::signature("x"),
            RegistrationError::ComponentNotFound { family: "A".into(), index: 1 },
            RegistrationError::CategoryAssembly(vec![]),
            RegistrationError::missing_parameter("Metric"),
            RegistrationError::image("x"),
            RegistrationError::Io(std::io::Error::other("x")),
            RegistrationError::runtime("x"),
            RegistrationError::UnknownFatal("x".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(RegistrationError::error_code).collect();
        assert!(codes.iter().all(|&c| c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_category_failures_are_listed() {
        let err = RegistrationError::CategoryAssembly(vec![
            CategoryFailure::new("Transform", "no Transform specified"),
            CategoryFailure::new("Metric", "component \"Foo\" not installed"),
        ]);
        let text = err.to_string();
        assert!(text.contains("Transform: no Transform specified"));
        assert!(text.contains("Metric"));
    }

    #[test]
    fn test_validation_lists_every_label_and_keeps_the_first_code() {
        let err = RegistrationError::Validation(vec![
            ComponentFailure::new("Registration0", RegistrationError::missing_parameter("NumberOfResolutions")),
            ComponentFailure::new("Resampler0", RegistrationError::runtime("bad format")),
        ]);
        assert_eq!(err.error_code(), 5);
        let text = err.to_string();
        assert!(text.contains("Registration0: Parameter error"));
        assert!(text.contains("Resampler0: Runtime error: bad format"));
    }

    #[test]
    fn test_core_errors_are_classified() {
        let image: RegistrationError = CoreError::image_io("a.nii", "missing").into();
        assert!(matches!(image, RegistrationError::Image(_)));
        let parameter: RegistrationError = CoreError::UnknownPixelType("bogus".into()).into();
        assert!(matches!(parameter, RegistrationError::Parameter(_)));
    }
}
