//! Error types for the add-on manager
//!
//! Every pipeline stage reports through [`Error`]. The first six variants are
//! the stage taxonomy callers match on; the rest are ambient.

use thiserror::Error;

/// Result type alias for add-on manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the add-on manager
#[derive(Error, Debug)]
pub enum Error {
    /// Unreachable host, transport failure or non-success status
    #[error("Network error: {0}")]
    Network(String),

    /// Archive entry resolving outside the extraction root
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// Corrupt zip or missing archive root directory
    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    /// Permission, missing parent, failed move or copy
    #[error("Filesystem error: {0}")]
    Filesystem(String),

    /// Registry and metadata store disagree after an operation
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Manifest, release or metadata file absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Raw I/O errors not attributed to a stage
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a security violation error
    pub fn security_violation(msg: impl Into<String>) -> Self {
        Self::SecurityViolation(msg.into())
    }

    /// Create a malformed archive error
    pub fn malformed_archive(msg: impl Into<String>) -> Self {
        Self::MalformedArchive(msg.into())
    }

    /// Create a filesystem error
    pub fn filesystem(msg: impl Into<String>) -> Self {
        Self::Filesystem(msg.into())
    }

    /// Create a consistency error
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this is a [`Error::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => Self::filesystem(format!("archive I/O failed: {}", e)),
            other => Self::malformed_archive(other.to_string()),
        }
    }
}
