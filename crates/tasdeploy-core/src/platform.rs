//! Platform kinds, platform versions and detection results

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// The kind of cluster distribution being targeted
///
/// `Unknown` is a sentinel meaning "not yet determined" and must never be
/// handed to the manifest renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Unknown,
    Kubernetes,
    OpenShift,
    MicroShift,
    HyperShift,
}

impl Platform {
    /// Whether the value is a concrete platform (not the `Unknown` sentinel)
    pub fn is_known(&self) -> bool {
        !matches!(self, Platform::Unknown)
    }

    /// OpenShift-family platforms share the SecurityContextConstraints API
    /// and the `node-role.kubernetes.io/master` control-plane label.
    pub fn is_openshift_like(&self) -> bool {
        matches!(self, Platform::OpenShift | Platform::HyperShift)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Kubernetes => "kubernetes",
            Self::OpenShift => "openshift",
            Self::MicroShift => "microshift",
            Self::HyperShift => "hypershift",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kubernetes" | "k8s" | "generic" => Ok(Self::Kubernetes),
            "openshift" | "ocp" => Ok(Self::OpenShift),
            "microshift" => Ok(Self::MicroShift),
            "hypershift" => Ok(Self::HyperShift),
            other => Err(CoreError::UnknownPlatform(other.to_string())),
        }
    }
}

/// A comparable platform version
///
/// Accepts the dotted forms found in the wild (`v1.28`, `1.28.3`,
/// `v1.28.3+k3s1`, `4.14.0-rc.2`, `v1.27.8-eks-8cb36c9`); only the numeric
/// `major.minor[.patch]` prefix participates in ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlatformVersion(semver::Version);

impl PlatformVersion {
    pub fn new(major: u64, minor: u64) -> Self {
        Self(semver::Version::new(major, minor, 0))
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    /// Returns true when this version is greater than or equal to `min`
    pub fn at_least(&self, min: &PlatformVersion) -> bool {
        self >= min
    }

    /// Same as [`at_least`](Self::at_least) but parses the minimum from a string
    pub fn at_least_str(&self, min: &str) -> Result<bool> {
        Ok(self.at_least(&min.parse()?))
    }
}

impl FromStr for PlatformVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| CoreError::InvalidVersion {
            version: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let numeric: String = trimmed
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let numeric = numeric.trim_end_matches('.');

        if numeric.is_empty() {
            return Err(invalid("no numeric component"));
        }

        let parts = numeric
            .split('.')
            .map(|p| p.parse::<u64>().map_err(|_| invalid("empty component")))
            .collect::<Result<Vec<_>>>()?;

        match parts.as_slice() {
            [major, minor] => Ok(Self(semver::Version::new(*major, *minor, 0))),
            [major, minor, patch, ..] => Ok(Self(semver::Version::new(*major, *minor, *patch))),
            _ => Err(invalid("expected at least major.minor")),
        }
    }
}

impl TryFrom<String> for PlatformVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PlatformVersion> for String {
    fn from(v: PlatformVersion) -> Self {
        v.to_string()
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.patch == 0 {
            write!(f, "v{}.{}", self.0.major, self.0.minor)
        } else {
            write!(f, "v{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
        }
    }
}

/// Where a detected value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    /// Supplied by the user, no cluster call was made
    UserSupplied,
    /// Read from the live cluster
    Cluster,
    /// Built-in default, used only where no cluster is involved (offline render)
    Fallback,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UserSupplied => "user-supplied",
            Self::Cluster => "cluster",
            Self::Fallback => "fallback",
        };
        write!(f, "{}", s)
    }
}

/// A discovered value, immutable once produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection<T> {
    pub discovered: T,
    pub source: DetectionSource,
    /// Human readable explanation of how the value was found
    pub reason: String,
}

impl<T> Detection<T> {
    pub fn user_supplied(discovered: T) -> Self {
        Self {
            discovered,
            source: DetectionSource::UserSupplied,
            reason: "user-supplied".to_string(),
        }
    }

    pub fn from_cluster(discovered: T, reason: impl Into<String>) -> Self {
        Self {
            discovered,
            source: DetectionSource::Cluster,
            reason: reason.into(),
        }
    }

    pub fn fallback(discovered: T, reason: impl Into<String>) -> Self {
        Self {
            discovered,
            source: DetectionSource::Fallback,
            reason: reason.into(),
        }
    }
}

/// A user-supplied `kind[:version]` platform specification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformOverride {
    pub platform: Option<Platform>,
    pub version: Option<PlatformVersion>,
}

impl PlatformOverride {
    pub fn is_empty(&self) -> bool {
        self.platform.is_none() && self.version.is_none()
    }
}

impl FromStr for PlatformOverride {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let (kind, version) = match s.split_once(':') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (s, None),
        };

        if kind.is_empty() {
            return Err(CoreError::InvalidPlatformSpec {
                spec: s.to_string(),
                reason: "missing platform kind before ':'".to_string(),
            });
        }

        let platform = kind.parse::<Platform>()?;
        let version = match version {
            Some(v) if !v.is_empty() => Some(v.parse::<PlatformVersion>()?),
            _ => None,
        };

        Ok(Self {
            platform: Some(platform),
            version,
        })
    }
}
