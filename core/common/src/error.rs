//! Common error types for filestore.

use thiserror::Error;

/// Boxed source error carried by [`Error::Integration`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for filestore operations.
///
/// Providers translate every backend-native failure into one of these
/// variants before it reaches a collection or context.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied input violates a precondition.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File content was rejected by the provider.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A required metadata field had no value at serialize time.
    #[error("Metadata field '{0}' is required")]
    RequiredField(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend refused access.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Any other backend fault, or malformed stored metadata.
    #[error("Integration error: {message}")]
    Integration {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Schema, registry or service wiring is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation was cancelled before it committed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Build an integration error without an underlying cause.
    pub fn integration(message: impl Into<String>) -> Self {
        Error::Integration {
            message: message.into(),
            source: None,
        }
    }

    /// Build an integration error wrapping the original cause.
    pub fn integration_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Integration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Translate an I/O error from a backend into the shared taxonomy.
    ///
    /// Permission failures become [`Error::AccessDenied`]; everything else is
    /// an [`Error::Integration`] that keeps the original error as its source.
    pub fn from_io(err: std::io::Error, context: impl Into<String>) -> Self {
        let context = context.into();
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                Error::AccessDenied(format!("{}: {}", context, err))
            }
            _ => Error::integration_with(context, err),
        }
    }

    /// Whether this error means the target did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
