//! Error types for manifest loading and rendering

use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManifestError {
    /// No embedded asset under this key; a packaging defect
    #[error("embedded manifest '{0}' not found")]
    MissingAsset(String),

    /// Embedded asset does not deserialize into its expected type
    #[error("embedded manifest '{key}' is invalid: {message}")]
    InvalidAsset { key: String, message: String },

    /// Rendering needs a concrete platform
    #[error("cannot render manifests for platform '{0}'")]
    UnsupportedPlatform(String),

    /// A user supplied configuration payload failed to parse or validate
    #[error("invalid {what}: {reason}")]
    InvalidPayload { what: String, reason: String },

    /// A workload template lacks the container a rule targets
    #[error("container '{container}' not found in {object}")]
    MissingContainer { object: String, container: String },

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ManifestError {
    fn from(e: serde_json::Error) -> Self {
        ManifestError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for ManifestError {
    fn from(e: serde_yaml::Error) -> Self {
        ManifestError::Serialization(e.to_string())
    }
}
