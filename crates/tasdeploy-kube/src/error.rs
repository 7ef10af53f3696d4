//! Error types for tasdeploy-kube

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for tasdeploy-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// One removal step that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalFailure {
    /// Sub-system the step belonged to, filled in by the orchestrator
    pub component: Option<String>,
    /// `Kind namespace/name` of the object, or the stage that failed
    pub object: String,
    pub message: String,
}

impl fmt::Display for RemovalFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component {
            Some(c) => write!(f, "[{}] {}: {}", c, self.object, self.message),
            None => write!(f, "{}: {}", self.object, self.message),
        }
    }
}

/// Errors that can occur during cluster operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The API server does not serve this kind at all
    #[error("resource type {api_version}/{kind} is not served by the cluster")]
    UnknownResource { api_version: String, kind: String },

    /// Creating an object failed; creation stops at the first failure
    #[error("failed to create {object}: {source}")]
    Create {
        object: String,
        #[source]
        source: Box<KubeError>,
    },

    /// Reading an object while waiting on it failed
    #[error("failed waiting for {object}: {source}")]
    Wait {
        object: String,
        #[source]
        source: Box<KubeError>,
    },

    /// Readiness or absence not observed within the bound
    #[error("timed out after {timeout:?} waiting for {kind} {key}")]
    WaitTimeout {
        kind: String,
        key: String,
        timeout: Duration,
    },

    /// Every removal step ran; these did not complete
    #[error("removal incomplete: {} step(s) failed", failures.len())]
    RemovalIncomplete { failures: Vec<RemovalFailure> },

    /// Platform or version could not be determined
    #[error("detection failed: {0}")]
    Detection(String),

    /// Object lacks the metadata an operation needs
    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error(transparent)]
    Manifest(#[from] tasdeploy_manifests::ManifestError),

    #[error(transparent)]
    Core(#[from] tasdeploy_core::CoreError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Raw API request could not be built
    #[error("invalid request: {0}")]
    Request(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<http::Error> for KubeError {
    fn from(e: http::Error) -> Self {
        KubeError::Request(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    ///
    /// A kind the cluster does not serve counts as not found: no object of
    /// that kind can exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            KubeError::UnknownResource { .. } => true,
            _ => false,
        }
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Failures carried by a removal error, empty for any other error
    pub fn removal_failures(&self) -> &[RemovalFailure] {
        match self {
            KubeError::RemovalIncomplete { failures } => failures,
            _ => &[],
        }
    }
}
