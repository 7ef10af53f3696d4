//! Deploy and remove orchestration across the three sub-systems
//!
//! Every run resolves the cluster target once, then walks the requested
//! components in [`Component::ALL`] order. Deployment stops at the first
//! failing stage. Removal runs every stage and reports all failures at the
//! end.

use kube::api::DynamicObject;
use serde::Serialize;
use tasdeploy_core::{
    ApiOptions, Platform, PlatformOverride, PlatformVersion, SchedulerOptions, UpdaterOptions,
};
use tasdeploy_manifests::{
    ApiManifests, Component, ManifestSet, SchedulerManifests, UpdaterManifests,
};
use tracing::{info, warn};

use crate::client::ClusterClient;
use crate::detect::{ClusterTarget, count_control_plane_nodes, detect};
use crate::error::{KubeError, RemovalFailure, Result};
use crate::lifecycle::{OperationSummary, apply_create, apply_delete, creation_plan, deletion_plan};
use crate::wait::WaitOptions;

/// Render options of every sub-system
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub api: ApiOptions,
    pub updater: UpdaterOptions,
    pub scheduler: SchedulerOptions,
}

/// Options for one deploy or remove run
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Platform and version supplied by the user, read from the cluster when empty
    pub platform: PlatformOverride,
    pub render: RenderOptions,
    /// Block on readiness (deploy) or absence (remove) when set
    pub wait: Option<WaitOptions>,
}

/// What a stage did
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub component: String,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
}

impl StageReport {
    fn new(component: Component, summary: OperationSummary) -> Self {
        Self {
            component: component.to_string(),
            succeeded: summary.succeeded,
            skipped: summary.skipped.into_iter().map(|(obj, _)| obj).collect(),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub target: ClusterTarget,
    pub stages: Vec<StageReport>,
}

/// Requested components in deployment order, without duplicates
pub fn ordered(components: &[Component]) -> Vec<Component> {
    if components.is_empty() {
        return Component::ALL.to_vec();
    }
    Component::ALL
        .into_iter()
        .filter(|c| components.contains(c))
        .collect()
}

/// Render one sub-system into its objects, in creation order
pub fn render_objects(
    component: Component,
    platform: Platform,
    version: &PlatformVersion,
    opts: &RenderOptions,
) -> Result<Vec<DynamicObject>> {
    let objects = match component {
        Component::Api => ApiManifests::load(platform, version)?
            .render(&opts.api)?
            .objects()?,
        Component::Updater => UpdaterManifests::load(
            opts.updater.kind,
            platform,
            version,
            opts.updater.namespace.as_deref(),
        )?
        .render(&opts.updater)?
        .objects()?,
        Component::Scheduler => {
            opts.scheduler.validate()?;
            SchedulerManifests::load(platform, version, opts.scheduler.namespace.as_deref())?
                .render(&opts.scheduler)?
                .objects()?
        }
    };
    Ok(creation_plan(objects)?
        .into_iter()
        .map(|op| op.object)
        .collect())
}

/// Orchestrates deploy and remove runs against one cluster
pub struct Deployer<'a> {
    client: &'a dyn ClusterClient,
}

impl<'a> Deployer<'a> {
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self { client }
    }

    /// Resolve the cluster target; an unresolved platform is fatal
    pub async fn detect(&self, user: &PlatformOverride) -> Result<ClusterTarget> {
        let target = detect(self.client, user).await?;
        if !target.platform.discovered.is_known() {
            return Err(KubeError::Detection(format!(
                "platform could not be determined ({})",
                target.platform.reason
            )));
        }
        Ok(target)
    }

    /// Create the requested sub-systems, all of them when `components` is empty
    pub async fn deploy(
        &self,
        components: &[Component],
        opts: &DeployOptions,
    ) -> Result<RunReport> {
        let target = self.detect(&opts.platform).await?;
        let platform = target.platform.discovered;
        let version = &target.version.discovered;

        let mut render = opts.render.clone();
        if render.scheduler.replicas == 0 && components_include(components, Component::Scheduler) {
            let nodes = count_control_plane_nodes(self.client).await?;
            let replicas = i32::try_from(nodes.max(1)).unwrap_or(i32::MAX);
            render.scheduler = render.scheduler.with_replicas(replicas);
            info!(
                replicas = render.scheduler.replicas,
                "scheduler replicas from control-plane nodes"
            );
        }

        let mut stages = Vec::new();
        for component in ordered(components) {
            info!(%component, %platform, %version, "deploying");
            let objects = render_objects(component, platform, version, &render)?;
            let plan = creation_plan(objects)?;
            let summary = apply_create(self.client, &plan, opts.wait).await?;
            info!(%component, result = %summary.summary(), "deployed");
            stages.push(StageReport::new(component, summary));
        }

        Ok(RunReport { target, stages })
    }

    /// Delete the requested sub-systems, all of them when `components` is empty
    ///
    /// Every stage runs even when an earlier one failed. The error lists every
    /// failed step tagged with its component.
    pub async fn remove(
        &self,
        components: &[Component],
        opts: &DeployOptions,
    ) -> Result<RunReport> {
        let target = self.detect(&opts.platform).await?;
        let platform = target.platform.discovered;
        let version = &target.version.discovered;

        let mut stages = Vec::new();
        let mut failures = Vec::new();
        for component in ordered(components) {
            info!(%component, %platform, %version, "removing");
            let tag = |mut f: RemovalFailure| {
                f.component = Some(component.to_string());
                f
            };

            let plan = match render_objects(component, platform, version, &opts.render)
                .and_then(deletion_plan)
            {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(%component, error = %e, "cannot render for removal");
                    failures.push(tag(RemovalFailure {
                        component: None,
                        object: "manifests".to_string(),
                        message: e.to_string(),
                    }));
                    continue;
                }
            };

            match apply_delete(self.client, &plan, opts.wait).await {
                Ok(summary) => {
                    info!(%component, result = %summary.summary(), "removed");
                    stages.push(StageReport::new(component, summary));
                }
                Err(KubeError::RemovalIncomplete { failures: stage }) => {
                    failures.extend(stage.into_iter().map(tag));
                }
                Err(e) => failures.push(tag(RemovalFailure {
                    component: None,
                    object: "stage".to_string(),
                    message: e.to_string(),
                })),
            }
        }

        if failures.is_empty() {
            Ok(RunReport { target, stages })
        } else {
            Err(KubeError::RemovalIncomplete { failures })
        }
    }
}

fn components_include(components: &[Component], component: Component) -> bool {
    components.is_empty() || components.contains(&component)
}
