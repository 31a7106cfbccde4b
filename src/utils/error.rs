//! Error Handling Module
//!
//! Defines the error type shared by the noisymatch library.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for noisymatch operations
#[derive(Error, Debug)]
pub enum NoisyMatchError {
    /// Error with dataset loading or label corruption
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction or shapes
    #[error("Model error: {0}")]
    Model(String),

    /// Error raised by the training driver
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint save/load error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for NoisyMatchError {
    fn from(err: serde_json::Error) -> Self {
        NoisyMatchError::Serialization(err.to_string())
    }
}

/// Convenience Result type for noisymatch operations
pub type Result<T> = std::result::Result<T, NoisyMatchError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| NoisyMatchError::InvalidInput(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| NoisyMatchError::InvalidInput(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| NoisyMatchError::InvalidInput(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| NoisyMatchError::InvalidInput(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NoisyMatchError::Dataset("label out of range".to_string());
        assert_eq!(format!("{}", err), "Dataset error: label out of range");
    }

    #[test]
    fn test_path_not_found() {
        let err = NoisyMatchError::PathNotFound(PathBuf::from("/data/malware/train.csv"));
        assert!(format!("{}", err).contains("train.csv"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parsed: std::result::Result<Vec<u32>, _> = serde_json::from_str("not json");
        let err: NoisyMatchError = parsed.unwrap_err().into();
        assert!(matches!(err, NoisyMatchError::Serialization(_)));
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let with_context = result.context("Failed to read checkpoint");
        assert!(with_context.is_err());
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let err = opt.with_context(|| "missing class 3".to_string()).unwrap_err();
        assert!(format!("{}", err).contains("missing class 3"));
    }
}
