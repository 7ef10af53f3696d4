//! CLI error types with exit code handling
//!
//! Every library error is folded into [`CliError`], which knows the exit
//! code it maps to and carries miette help text.

use miette::Diagnostic;
use tasdeploy_core::CoreError;
use tasdeploy_kube::KubeError;
use tasdeploy_manifests::ManifestError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Cluster configuration checks failed
    #[error("Validation failed with {errors} error(s)")]
    #[diagnostic(
        code(tasdeploy::cli::validation),
        help("fix the kubelet configuration of the reported nodes, then run again")
    )]
    ValidationFailed { errors: usize },

    /// Manifests could not be rendered
    #[error("Render error: {message}")]
    #[diagnostic(code(tasdeploy::cli::render))]
    Render {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Talking to the cluster failed
    #[error("Cluster error: {message}")]
    #[diagnostic(code(tasdeploy::cli::cluster))]
    Cluster {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Some removal steps did not complete
    #[error("Removal incomplete: {failed} step(s) failed")]
    #[diagnostic(
        code(tasdeploy::cli::removal),
        help("the failed steps are listed above; re-run remove once they are resolved")
    )]
    RemovalIncomplete { failed: usize },

    /// Invalid option or argument
    #[error("Invalid usage: {message}")]
    #[diagnostic(code(tasdeploy::cli::usage))]
    Usage {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(tasdeploy::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(tasdeploy::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::ValidationFailed { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Render { .. } => exit_codes::RENDER_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::RemovalIncomplete { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Usage { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create a usage error
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: None,
        }
    }

    /// Create a usage error with help text
    pub fn usage_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            other => CliError::usage(other.to_string()),
        }
    }
}

impl From<ManifestError> for CliError {
    fn from(err: ManifestError) -> Self {
        let help = match &err {
            ManifestError::InvalidPayload { what, .. } => {
                Some(format!("check the {} document passed on the command line", what))
            }
            ManifestError::UnsupportedPlatform(_) => {
                Some("pass --platform kind[:version] to pick a platform".to_string())
            }
            _ => None,
        };
        CliError::Render {
            message: err.to_string(),
            help,
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Manifest(e) => e.into(),
            KubeError::Core(e) => e.into(),
            KubeError::RemovalIncomplete { failures } => CliError::RemovalIncomplete {
                failed: failures.len(),
            },
            KubeError::Detection(message) => CliError::Cluster {
                message,
                help: Some("pass --platform kind[:version] to skip detection".to_string()),
            },
            other => CliError::Cluster {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::ValidationFailed { errors: 1 }.exit_code(), 2);
        assert_eq!(CliError::usage("x").exit_code(), 64);
        assert_eq!(CliError::RemovalIncomplete { failed: 2 }.exit_code(), 4);
        assert_eq!(CliError::internal("x").exit_code(), 1);
    }

    #[test]
    fn test_messages() {
        insta::assert_snapshot!(
            CliError::ValidationFailed { errors: 2 }.to_string(),
            @"Validation failed with 2 error(s)"
        );
        insta::assert_snapshot!(
            CliError::RemovalIncomplete { failed: 1 }.to_string(),
            @"Removal incomplete: 1 step(s) failed"
        );
    }

    #[test]
    fn test_manifest_errors_are_render_errors() {
        let err: CliError = KubeError::Manifest(ManifestError::InvalidPayload {
            what: "scheduler config".to_string(),
            reason: "not a mapping".to_string(),
        })
        .into();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("not a mapping"));
    }

    #[test]
    fn test_core_errors_are_usage_errors() {
        let err: CliError = CoreError::UnknownPlatform("nomad".to_string()).into();
        assert_eq!(err.exit_code(), 64);
    }
}
