//! Lifecycle events produced by the registration method.

use std::fmt;

/// What the registration method did on its last `advance()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationEvent {
    ResolutionStart { level: usize },
    Iteration,
    ResolutionEnd,
    RegistrationEnd,
}

impl fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolutionStart { level } => write!(f, "ResolutionStart({level})"),
            Self::Iteration => f.write_str("Iteration"),
            Self::ResolutionEnd => f.write_str("ResolutionEnd"),
            Self::RegistrationEnd => f.write_str("RegistrationEnd"),
        }
    }
}

/// Lifecycle hook names, used for log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeAll,
    BeforeRegistration,
    BeforeEachResolution,
    AfterEachIteration,
    AfterEachResolution,
    AfterRegistration,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
