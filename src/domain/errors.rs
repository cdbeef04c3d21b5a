//! Domain error types
//!
//! This module defines the error hierarchy for hcimport. All errors are
//! domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main hcimport error type
///
/// This is the primary error type used throughout the application.
/// Failures are local to one import item: the coordinator records them
/// against the item's key and moves on to the next item.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An imaging object, message or resource could not be parsed
    ///
    /// Aborts the current series, message or resource only.
    #[error("Malformed source record: {0}")]
    MalformedSourceRecord(String),

    /// More than one subject in the project carries the same master code
    ///
    /// This is a data-integrity condition and is never resolved automatically.
    #[error("Ambiguous identity: {matches} subjects share master code {master_code}")]
    AmbiguousIdentity { master_code: String, matches: usize },

    /// A resource references its patient through a resource type that is not modeled
    #[error("Unsupported reference: {0}")]
    UnsupportedReference(String),

    /// A resource carries no patient or subject reference at all
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// Network or authentication failure from an external collaborator
    #[error("Upstream service error: {0}")]
    Upstream(#[from] UpstreamServiceError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Archive container errors
    #[error("Archive error: {0}")]
    Archive(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl ImportError {
    /// Whether the error excludes the item from output without counting as a failure
    pub fn is_soft_skip(&self) -> bool {
        matches!(
            self,
            ImportError::UnsupportedReference(_) | ImportError::MissingReference(_)
        )
    }

    /// Whether the error is a create conflict reported by the destination platform
    pub fn is_conflict(&self) -> bool {
        matches!(self, ImportError::Upstream(UpstreamServiceError::Conflict(_)))
    }
}

/// Errors raised by external collaborators
///
/// Covers the healthcare data store, the destination platform and the
/// identity service. These errors don't expose third-party HTTP client types.
#[derive(Debug, Error)]
pub enum UpstreamServiceError {
    /// Failed to connect to the service
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Authentication failed (401/403)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Requested entity does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },

    /// Timeout
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Response body could not be interpreted
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

impl UpstreamServiceError {
    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamServiceError::ConnectionFailed(_)
                | UpstreamServiceError::Timeout(_)
                | UpstreamServiceError::ServerError { .. }
        )
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ImportError {
    fn from(err: toml::de::Error) -> Self {
        ImportError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<zip::result::ZipError> for ImportError {
    fn from(err: zip::result::ZipError) -> Self {
        ImportError::Archive(err.to_string())
    }
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::Configuration(format!("Code table error: {err}"))
    }
}
