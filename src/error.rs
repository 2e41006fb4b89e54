//! Error types for background removal
//!
//! Two layers live here. [`BgRemovalError`] is what the removal capability
//! (decoding, model management, inference, matting) reports. [`RemoveError`] is
//! the two-kind taxonomy the command-line shell exposes: a missing input file,
//! or anything else.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Errors raised by the background removal capability
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Input/output errors (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model lookup, download or loading errors
    #[error("Model error: {0}")]
    Model(String),

    /// Network errors while fetching models
    #[error("Network error: {message}: {source}")]
    Network {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Preprocessing, matting or postprocessing errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error wrapping the underlying cause
    pub fn network_error<S, E>(msg: S, error: E) -> Self
    where
        S: Into<String>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Network {
            message: msg.into(),
            source: error.into(),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }
}

/// Failure of a single "remove background" invocation
///
/// The shell distinguishes the two kinds only by message text; both end the
/// process with exit status 1.
#[derive(Error, Debug)]
pub enum RemoveError {
    /// The input path did not exist when the invocation was validated
    #[error("Error: Input image not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Any other failure: reading, writing, decoding, model or inference
    #[error("An error occurred: {0}")]
    OperationFailed(String),
}

impl RemoveError {
    /// Wrap any displayable failure as [`RemoveError::OperationFailed`]
    pub fn failed<E: std::fmt::Display>(error: E) -> Self {
        Self::OperationFailed(error.to_string())
    }
}

impl From<BgRemovalError> for RemoveError {
    fn from(error: BgRemovalError) -> Self {
        Self::failed(error)
    }
}

impl From<std::io::Error> for RemoveError {
    fn from(error: std::io::Error) -> Self {
        Self::failed(error)
    }
}
