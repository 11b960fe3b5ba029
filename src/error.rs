//! Error types for hub model loading, preprocessing and inference

use thiserror::Error;

/// Result type alias for hubvision operations
pub type Result<T> = std::result::Result<T, HubVisionError>;

/// Comprehensive error types for hub adapter operations
#[derive(Error, Debug)]
pub enum HubVisionError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON parsing errors for hub configuration files
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Network errors during hub downloads
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid caller-supplied input (missing pixel values, bad batch element, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// A requested inference backend was not compiled into this build
    #[error(
        "{backend} backend is not available: this build was compiled without the `{feature}` \
         feature. Rebuild with `--features {feature}` to enable it (pulls in {crates})."
    )]
    MissingBackend {
        /// Human-readable backend name
        backend: &'static str,
        /// Cargo feature that enables the backend
        feature: &'static str,
        /// Crates the feature pulls in
        crates: &'static str,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubVisionError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a network error with operation context
    pub fn network_error<E: std::fmt::Display>(context: &str, error: E) -> Self {
        Self::Network(format!("{context}: {error}"))
    }

    /// Create a file I/O error with operation context
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

    /// Create an error for a configuration key missing from a hub config dict
    pub fn missing_config_key(key: &str, model_id: &str) -> Self {
        Self::InvalidConfig(format!(
            "Hub config for '{model_id}' is missing required key `{key}`"
        ))
    }
}
