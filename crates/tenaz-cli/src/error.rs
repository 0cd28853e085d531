//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tenaz library error
    #[error(transparent)]
    Tenaz(#[from] tenaz::TenazError),

    /// Report generation error
    #[error("Report generation failed: {message}")]
    ReportGeneration {
        /// Error message
        message: String,
    },
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a report generation error
    #[must_use]
    pub fn report_generation(message: impl Into<String>) -> Self {
        Self::ReportGeneration {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error() {
        let err = CliError::config("bad timeout");
        assert_eq!(err.to_string(), "Configuration error: bad timeout");
    }

    #[test]
    fn test_invalid_argument() {
        let err = CliError::invalid_argument("--jobs must be at least 1");
        assert!(err.to_string().contains("--jobs"));
    }

    #[test]
    fn test_report_generation() {
        let err = CliError::report_generation("disk full");
        assert!(err.to_string().starts_with("Report generation failed"));
    }

    #[test]
    fn test_from_io() {
        let err: CliError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, CliError::Io(_)));
    }

    #[test]
    fn test_library_error_is_transparent() {
        let err: CliError = tenaz::TenazError::invalid_scenario("drawer", "no steps").into();
        assert_eq!(err.to_string(), "Invalid scenario 'drawer': no steps");
    }
}
