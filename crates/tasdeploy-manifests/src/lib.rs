//! tasdeploy Manifests - embedded manifests and rendering rules
//!
//! Every sub-system the deployer manages is described by a typed manifest
//! set loaded from YAML templates compiled into the binary:
//!
//! - [`ApiManifests`]: the NodeResourceTopology CustomResourceDefinition
//! - [`UpdaterManifests`]: either the resource-topology-exporter ([`RteManifests`])
//!   or the NFD topology updater ([`NfdManifests`])
//! - [`SchedulerManifests`]: the secondary scheduler and its controller
//!
//! Templates are never mutated: [`ManifestSet::render`] always returns a new
//! set built from a deep copy.

pub mod api;
pub mod assets;
pub mod error;
pub mod nfd;
pub mod objects;
mod render;
pub mod rte;
pub mod sched;
pub mod schedconfig;
pub mod templates;
pub mod updater;

pub use api::ApiManifests;
pub use error::{ManifestError, Result};
pub use nfd::NfdManifests;
pub use objects::{Component, ManifestSet, object_display, to_dynamic, to_yaml_stream};
pub use rte::RteManifests;
pub use sched::SchedulerManifests;
pub use updater::UpdaterManifests;

/// Namespace of the updater when none is requested
pub const DEFAULT_UPDATER_NAMESPACE: &str = "tas-topology-updater";

/// Namespace of the scheduler when none is requested
pub const DEFAULT_SCHEDULER_NAMESPACE: &str = "tas-scheduler";
