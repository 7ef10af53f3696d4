//! The manifest set abstraction shared by every sub-system

use kube::api::DynamicObject;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{ManifestError, Result};

/// A sub-system the deployer installs as one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// The NodeResourceTopology API definition
    Api,
    /// RTE or NFD, publishing NodeResourceTopology objects
    Updater,
    /// The secondary scheduler consuming them
    Scheduler,
}

impl Component {
    /// All components in deployment order
    pub const ALL: [Component; 3] = [Component::Api, Component::Updater, Component::Scheduler];
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Api => "api",
            Self::Updater => "topology-updater",
            Self::Scheduler => "scheduler-plugin",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Component {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "api" => Ok(Self::Api),
            "topology-updater" | "updater" => Ok(Self::Updater),
            "scheduler-plugin" | "scheduler" => Ok(Self::Scheduler),
            other => Err(ManifestError::InvalidPayload {
                what: "component".to_string(),
                reason: format!(
                    "unknown component '{}', expected api, topology-updater or scheduler-plugin",
                    other
                ),
            }),
        }
    }
}

/// Typed manifests for one sub-system
///
/// A loaded set is a template. `render` never touches it and instead returns
/// a parameterized copy, so the same template can be rendered many times.
pub trait ManifestSet: Sized + Clone {
    type Options;

    /// Apply every rendering rule to a deep copy of this set
    fn render(&self, options: &Self::Options) -> Result<Self>;

    /// All objects of the set in creation order
    fn objects(&self) -> Result<Vec<DynamicObject>>;

    /// Namespace owning the namespaced objects, if the set has one
    fn namespace(&self) -> Option<&str>;
}

/// Convert a typed Kubernetes object into its dynamic form
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject> {
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}

/// `Kind namespace/name`, or `Kind name` for cluster-scoped objects
pub fn object_display(obj: &DynamicObject) -> String {
    let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("Object");
    let name = obj.metadata.name.as_deref().unwrap_or("<unnamed>");
    match obj.metadata.namespace.as_deref() {
        Some(ns) => format!("{} {}/{}", kind, ns, name),
        None => format!("{} {}", kind, name),
    }
}

/// Serialize objects into a multi-document YAML stream
pub fn to_yaml_stream(objects: &[DynamicObject]) -> Result<String> {
    let mut out = String::new();
    for obj in objects {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(obj)?);
    }
    Ok(out)
}
