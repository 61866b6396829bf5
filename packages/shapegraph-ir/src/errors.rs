//! Error types for shapegraph-ir
//!
//! Provides unified error handling across the crate.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for shapegraph-ir operations
#[derive(Debug, Error)]
pub enum ShapeGraphError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed program text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Well-formed text describing an inconsistent program
    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    /// Query about something the analysis never saw
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ShapeGraphError {
    /// Create a parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        ShapeGraphError::Parse(msg.into())
    }

    /// Create an invalid-program error
    pub fn invalid_program(msg: impl Into<String>) -> Self {
        ShapeGraphError::InvalidProgram(msg.into())
    }

    /// Create an analysis error
    pub fn analysis(msg: impl Into<String>) -> Self {
        ShapeGraphError::Analysis(msg.into())
    }
}

impl From<serde_json::Error> for ShapeGraphError {
    fn from(err: serde_json::Error) -> Self {
        ShapeGraphError::parse_error(err.to_string())
    }
}

/// Result type alias for shape analysis operations
pub type Result<T> = std::result::Result<T, ShapeGraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ShapeGraphError::invalid_program("duplicate function id f1");
        assert_eq!(err.to_string(), "Invalid program: duplicate function id f1");

        let err: ShapeGraphError = ConfigError::UnknownMode("x".into()).into();
        assert!(err.to_string().starts_with("Configuration error: Unknown mode 'x'"));
    }

    #[test]
    fn test_json_errors_become_parse_errors() {
        let json_err = serde_json::from_str::<u32>("{").unwrap_err();
        let err: ShapeGraphError = json_err.into();
        assert!(matches!(err, ShapeGraphError::Parse(_)));
    }
}
