//! Result and error types for Tenaz.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverError;
use crate::resolver::ResolutionError;

/// Result type for Tenaz operations
pub type TenazResult<T> = Result<T, TenazError>;

/// Errors raised outside of the step boundary: loading configuration and
/// scenario documents, writing reports, talking to the driver before a
/// scenario starts.
#[derive(Debug, Error)]
pub enum TenazError {
    /// Invalid engine configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Scenario document is malformed or violates a structural rule
    #[error("Invalid scenario '{scenario}': {message}")]
    InvalidScenario {
        /// Scenario name (or file path when the name is unknown)
        scenario: String,
        /// Error message
        message: String,
    },

    /// Text pattern failed to compile
    #[error("Invalid text pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Pattern source
        pattern: String,
        /// Error message
        message: String,
    },

    /// Browser automation capability failed
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl TenazError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a scenario validation error
    #[must_use]
    pub fn invalid_scenario(scenario: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            scenario: scenario.into(),
            message: message.into(),
        }
    }
}

/// Failure taxonomy at the step boundary.
///
/// Locator, action and assertion failures are converted into a step result.
/// Only `DriverError` aborts a scenario regardless of `continue_on_failure`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    /// No candidate locator matched
    #[error("not found: {message}")]
    NotFound {
        /// Error message
        message: String,
    },

    /// Several elements matched with no disambiguating constraint
    #[error("ambiguous match: {message}")]
    AmbiguousMatch {
        /// Error message
        message: String,
    },

    /// Interaction failed on a resolved element
    #[error("action failed: {message}")]
    ActionError {
        /// Error message
        message: String,
    },

    /// Expected condition not met
    #[error("assertion failed: {message}")]
    AssertionFailure {
        /// Error message
        message: String,
    },

    /// A wait or the scenario timeout elapsed
    #[error("timed out: {message}")]
    TimeoutError {
        /// Error message
        message: String,
    },

    /// The browser capability itself failed
    #[error("driver error: {0}")]
    DriverError(DriverError),
}

impl StepError {
    /// Serialisable discriminant
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::AmbiguousMatch { .. } => FailureKind::AmbiguousMatch,
            Self::ActionError { .. } => FailureKind::ActionError,
            Self::AssertionFailure { .. } => FailureKind::AssertionFailure,
            Self::TimeoutError { .. } => FailureKind::TimeoutError,
            Self::DriverError(_) => FailureKind::DriverError,
        }
    }

    /// Fatal failures abort the scenario immediately
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DriverError(_))
    }

    /// Create a timeout error
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TimeoutError {
            message: message.into(),
        }
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailure {
            message: message.into(),
        }
    }
}

impl From<ResolutionError> for StepError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::NotFound { .. } => Self::NotFound {
                message: err.to_string(),
            },
            ResolutionError::Ambiguous { .. } => Self::AmbiguousMatch {
                message: err.to_string(),
            },
            ResolutionError::Driver { error, .. } => Self::DriverError(error),
        }
    }
}

/// Step failure discriminant recorded in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `NotFound`
    NotFound,
    /// `AmbiguousMatch`
    AmbiguousMatch,
    /// `ActionError`
    ActionError,
    /// `AssertionFailure`
    AssertionFailure,
    /// `TimeoutError`
    TimeoutError,
    /// `DriverError`
    DriverError,
}

impl FailureKind {
    /// Report label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::AmbiguousMatch => "AmbiguousMatch",
            Self::ActionError => "ActionError",
            Self::AssertionFailure => "AssertionFailure",
            Self::TimeoutError => "TimeoutError",
            Self::DriverError => "DriverError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverErrorKind;

    #[test]
    fn test_config_error_display() {
        let err = TenazError::config("poll interval must be non-zero");
        assert!(err.to_string().contains("Configuration"));
        assert!(err.to_string().contains("poll interval"));
    }

    #[test]
    fn test_invalid_scenario_display() {
        let err = TenazError::invalid_scenario("drawer", "no steps");
        assert_eq!(err.to_string(), "Invalid scenario 'drawer': no steps");
    }

    #[test]
    fn test_driver_error_is_transparent() {
        let err: TenazError =
            DriverError::new(DriverErrorKind::PageCrashed, "target closed").into();
        assert!(err.to_string().contains("target closed"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: TenazError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }

    #[test]
    fn test_step_error_kinds() {
        assert_eq!(
            StepError::timeout("scenario exceeded 5000ms").kind(),
            FailureKind::TimeoutError
        );
        assert!(StepError::DriverError(DriverError::crashed("gone")).is_fatal());
        assert!(!StepError::assertion("Unknown").is_fatal());
        assert_eq!(FailureKind::AmbiguousMatch.to_string(), "AmbiguousMatch");
    }

    #[test]
    fn test_resolution_error_conversion() {
        let not_found = ResolutionError::NotFound {
            target: "[text ~\"Ready\"]".into(),
            attempts: Vec::new(),
        };
        assert_eq!(StepError::from(not_found).kind(), FailureKind::NotFound);

        let fatal = ResolutionError::Driver {
            target: "t".into(),
            error: DriverError::new(DriverErrorKind::PageCrashed, "boom"),
            attempts: Vec::new(),
        };
        assert!(StepError::from(fatal).is_fatal());
    }
}
