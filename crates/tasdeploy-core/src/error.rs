//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("unknown platform '{0}' (expected one of: kubernetes, openshift, hypershift, microshift)")]
    UnknownPlatform(String),

    #[error("invalid platform version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("invalid platform specification '{spec}': {reason}")]
    InvalidPlatformSpec { spec: String, reason: String },

    #[error("invalid option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("failed to parse settings: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
