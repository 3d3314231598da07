//! Error types shared by the Imagen server crates.
//!
//! Everything here eventually renders to a single line, either as an MCP
//! error message or as the `error` column of a failed job, so every variant
//! carries the context needed to act on it from that line alone.
//!
//! # Error Categories
//!
//! - `ConfigError`: Missing or invalid configuration
//! - `AuthError`: Application Default Credentials failures
//! - `Error::Api`: Vertex AI answered with a non-success HTTP status
//! - `Error::Request`: Vertex AI could not be reached at all
//! - `Error::NoImages`: Vertex AI answered but returned no image data
//! - `Error::Validation`: Input validation failures
//! - `Error::Io`: File system operations

use thiserror::Error;

/// Unified error type for the common library.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (missing env vars, invalid values)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Authentication errors (ADC not configured, token refresh failures)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Non-success HTTP response from the API
    #[error("API error for {endpoint} (HTTP {status_code}): {message}")]
    Api {
        /// The API endpoint that was called
        endpoint: String,
        /// HTTP status code returned by the API
        status_code: u16,
        /// Response body or a description of the failure
        message: String,
    },

    /// The request never produced an HTTP response
    #[error("Request to {endpoint} failed: {message}")]
    Request {
        /// The API endpoint that was called
        endpoint: String,
        /// Transport error
        message: String,
    },

    /// A successful response with no usable image
    #[error("No images returned from {endpoint}{}", .reason.as_deref().map(|r| format!(" (filtered: {})", r)).unwrap_or_default())]
    NoImages {
        /// The API endpoint that was called
        endpoint: String,
        /// Responsible-AI filter reason, when the API gave one
        reason: Option<String>,
    },

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// File system I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new API error with endpoint, status code, and message.
    ///
    /// ```
    /// use adk_rust_mcp_common::error::Error;
    ///
    /// let err = Error::api(
    ///     "https://us-central1-aiplatform.googleapis.com/v1/models/imagen:predict",
    ///     500,
    ///     "Internal server error"
    /// );
    /// assert!(err.to_string().contains("aiplatform.googleapis.com"));
    /// assert!(err.to_string().contains("500"));
    /// ```
    pub fn api(endpoint: impl Into<String>, status_code: u16, message: impl Into<String>) -> Self {
        Error::Api {
            endpoint: endpoint.into(),
            status_code,
            message: message.into(),
        }
    }

    /// Create a new transport error.
    pub fn request(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Request {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create an error for a response without images.
    ///
    /// ```
    /// use adk_rust_mcp_common::error::Error;
    ///
    /// let err = Error::no_images("imagen", Some("Unsafe content".to_string()));
    /// assert!(err.to_string().contains("filtered: Unsafe content"));
    /// assert!(!Error::no_images("imagen", None).to_string().contains("filtered"));
    /// ```
    pub fn no_images(endpoint: impl Into<String>, reason: Option<String>) -> Self {
        Error::NoImages {
            endpoint: endpoint.into(),
            reason,
        }
    }

    /// Create a new validation error.
    ///
    /// ```
    /// use adk_rust_mcp_common::error::Error;
    ///
    /// let err = Error::validation("prompt cannot be empty");
    /// assert!(err.to_string().contains("prompt cannot be empty"));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// HTTP status of an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Whether the remote API rejected the request for rate or quota reasons.
    pub fn is_rate_limited(&self) -> bool {
        self.status_code() == Some(429)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set
    #[error("Required environment variable {0} is not set")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    pub fn missing_env_var(name: impl Into<String>) -> Self {
        ConfigError::MissingEnvVar(name.into())
    }

    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue(name.into(), reason.into())
    }
}

/// Application Default Credentials errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// ADC is not configured
    #[error("ADC not configured. Run 'gcloud auth application-default login' or set GOOGLE_APPLICATION_CREDENTIALS")]
    NotConfigured,

    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

impl AuthError {
    pub fn refresh_failed(message: impl Into<String>) -> Self {
        AuthError::RefreshFailed(message.into())
    }
}

/// Result type alias using the unified Error type.
pub type Result<T> = std::result::Result<T, Error>;
