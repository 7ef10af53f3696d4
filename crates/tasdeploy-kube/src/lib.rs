//! tasdeploy Kube - cluster operations for tasdeploy
//!
//! This crate provides:
//! - **Cluster Client**: a narrow [`ClusterClient`] seam over kube-rs, plus an in-memory mock
//! - **Detection**: platform kind and version from a user override or the live cluster
//! - **Lifecycle**: ordered creation and continue-on-error removal of rendered objects
//! - **Waits**: bounded polling for readiness and absence predicates
//! - **Orchestration**: [`Deployer`] sequencing API, updater and scheduler stages
//! - **Validation**: kubelet configuration checks on worker nodes

pub mod client;
pub mod deployer;
pub mod detect;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod validate;
pub mod wait;

pub use client::{ClusterClient, KubeClusterClient, ListSelector, ObjectKey};
pub use deployer::{DeployOptions, Deployer, RenderOptions, RunReport, StageReport, render_objects};
pub use detect::{
    ClusterTarget, count_control_plane_nodes, default_version, detect, find_platform, find_version,
    offline_target,
};
pub use error::{KubeError, RemovalFailure, Result};
pub use lifecycle::{
    OperationSummary, ResourceCategory, WaitableObject, apply_create, apply_delete,
    creation_plan, deletion_plan, to_creatable_objects, to_deletable_objects,
};
pub use mock::{MockClusterClient, MockOperation, OperationCounts};
pub use validate::{Severity, ValidationReport, ValidationResult, validate_cluster};
pub use wait::{WaitFor, WaitOptions, wait_for};
