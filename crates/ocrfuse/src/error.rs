//! Error types for ocrfuse.
//!
//! # Error Handling Philosophy
//!
//! **System errors always bubble up unchanged:**
//! - `FusionError::Io` (from `std::io::Error`) - file system errors, permission errors
//!
//! **Only one application error escapes `process_image`:**
//! - `ImageLoad` - the input bytes cannot be decoded as an image
//!
//! Everything else degrades into data rather than errors:
//! - an engine failure or timeout becomes an empty [`EngineOutcome`](crate::types::EngineOutcome)
//! - a cache read/write failure becomes a cache miss / no-op, logged but never surfaced
//! - "all engines failed" is a valid [`OcrResult`](crate::types::OcrResult) with
//!   `method = Failed`, not an error

use thiserror::Error;

/// Result type alias using `FusionError`.
pub type Result<T> = std::result::Result<T, FusionError>;

/// Main error type for all ocrfuse operations.
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image load error: {message}")]
    ImageLoad {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("engine error: {message}")]
    Engine {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FusionError {
    /// Create an ImageLoad error.
    pub fn image_load<S: Into<String>>(message: S) -> Self {
        Self::ImageLoad {
            message: message.into(),
            source: None,
        }
    }

    /// Create an ImageLoad error with source.
    pub fn image_load_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ImageLoad {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an Engine error.
    pub fn engine<S: Into<String>>(message: S) -> Self {
        Self::Engine {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Cache error.
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Cache error with source.
    pub fn cache_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Cache {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a Validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FusionError = io_err.into();
        assert!(matches!(err, FusionError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_image_load_error() {
        let err = FusionError::image_load("not a PNG");
        assert_eq!(err.to_string(), "image load error: not a PNG");
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_image_load_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad data");
        let err = FusionError::image_load_with_source("decode failed", source);
        assert_eq!(err.to_string(), "image load error: decode failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_engine_error() {
        let err = FusionError::engine("backend crashed");
        assert_eq!(err.to_string(), "engine error: backend crashed");
    }

    #[test]
    fn test_cache_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "cannot write");
        let err = FusionError::cache_with_source("cache write failed", source);
        assert_eq!(err.to_string(), "cache error: cache write failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_error() {
        let err = FusionError::validation("max_workers must be non-zero");
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: FusionError = json_err.into();
        assert!(matches!(err, FusionError::Serialization(_)));
    }
}
