//! Secondary scheduler manifests

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, PodSpec, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::api::DynamicObject;
use tasdeploy_core::args::set_flag_value;
use tasdeploy_core::{Images, Platform, PlatformVersion, SchedulerOptions, mirror};

use crate::DEFAULT_SCHEDULER_NAMESPACE;
use crate::assets;
use crate::error::Result;
use crate::objects::{ManifestSet, to_dynamic};
use crate::render::{
    args_mut, bind_service_account, container_mut, control_plane_label, ensure_known,
    network_policies, pin_to_control_plane, pod_spec_mut, set_data, set_image, set_namespace,
};
use crate::schedconfig::{self, CONFIG_KEY, SchedulerConfigParams};

const SCHEDULER_CONTAINER: &str = "topo-aware-scheduler";
const CONTROLLER_CONTAINER: &str = "topo-aware-controller";
const CONFIG_PATH: &str = "/etc/kubernetes/scheduler-config.yaml";

#[derive(Debug, Clone)]
pub struct SchedulerManifests {
    pub namespace: Namespace,
    pub service_account: ServiceAccount,
    pub cluster_role: ClusterRole,
    pub cluster_role_binding: ClusterRoleBinding,
    /// Grants the built-in kube-scheduler role to the secondary scheduler
    pub cluster_role_binding_kube_scheduler: ClusterRoleBinding,
    pub role: Role,
    pub role_binding: RoleBinding,
    pub config_map: ConfigMap,
    pub controller_service_account: ServiceAccount,
    pub controller_cluster_role: ClusterRole,
    pub controller_cluster_role_binding: ClusterRoleBinding,
    pub controller_deployment: Deployment,
    /// The scheduler itself, the primary workload of the set
    pub deployment: Deployment,
    pub network_policies: Vec<NetworkPolicy>,
    platform: Platform,
    config_api_version: &'static str,
}

fn account_name(sa: &ServiceAccount, fallback: &str) -> String {
    sa.metadata
        .name
        .clone()
        .unwrap_or_else(|| fallback.to_string())
}

fn deployment_pod(deployment: &mut Deployment) -> Option<&mut PodSpec> {
    deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
}

impl SchedulerManifests {
    pub fn load(
        platform: Platform,
        version: &PlatformVersion,
        namespace: Option<&str>,
    ) -> Result<Self> {
        ensure_known(platform)?;
        let mut set = Self {
            namespace: assets::load("sched/namespace.yaml")?,
            service_account: assets::load("sched/serviceaccount.yaml")?,
            cluster_role: assets::load("sched/clusterrole.yaml")?,
            cluster_role_binding: assets::load("sched/clusterrolebinding.yaml")?,
            cluster_role_binding_kube_scheduler: assets::load(
                "sched/clusterrolebinding-kube-scheduler.yaml",
            )?,
            role: assets::load("sched/role.yaml")?,
            role_binding: assets::load("sched/rolebinding.yaml")?,
            config_map: assets::load("sched/configmap.yaml")?,
            controller_service_account: assets::load("sched/controller-serviceaccount.yaml")?,
            controller_cluster_role: assets::load("sched/controller-clusterrole.yaml")?,
            controller_cluster_role_binding: assets::load(
                "sched/controller-clusterrolebinding.yaml",
            )?,
            controller_deployment: assets::load("sched/controller-deployment.yaml")?,
            deployment: assets::load("sched/deployment.yaml")?,
            network_policies: Vec::new(),
            platform,
            config_api_version: schedconfig::api_version_for(platform, version),
        };
        set.propagate_namespace(namespace.unwrap_or(DEFAULT_SCHEDULER_NAMESPACE));
        Ok(set)
    }

    /// Scheduler configuration API version chosen for the platform version
    pub fn config_api_version(&self) -> &'static str {
        self.config_api_version
    }

    /// Rendered scheduler configuration, if any
    pub fn scheduler_config(&self) -> Option<&str> {
        self.config_map
            .data
            .as_ref()
            .and_then(|d| d.get(CONFIG_KEY))
            .map(String::as_str)
    }

    fn propagate_namespace(&mut self, ns: &str) {
        self.namespace.metadata.name = Some(ns.to_string());
        for meta in [
            &mut self.service_account.metadata,
            &mut self.role.metadata,
            &mut self.role_binding.metadata,
            &mut self.config_map.metadata,
            &mut self.controller_service_account.metadata,
            &mut self.controller_deployment.metadata,
            &mut self.deployment.metadata,
        ] {
            set_namespace(meta, ns);
        }
        for policy in &mut self.network_policies {
            set_namespace(&mut policy.metadata, ns);
        }

        let scheduler = account_name(&self.service_account, SCHEDULER_CONTAINER);
        bind_service_account(&mut self.cluster_role_binding.subjects, &scheduler, ns);
        bind_service_account(
            &mut self.cluster_role_binding_kube_scheduler.subjects,
            &scheduler,
            ns,
        );
        bind_service_account(&mut self.role_binding.subjects, &scheduler, ns);
        if let Some(pod) = deployment_pod(&mut self.deployment) {
            pod.service_account_name = Some(scheduler);
        }

        let controller = account_name(&self.controller_service_account, CONTROLLER_CONTAINER);
        bind_service_account(
            &mut self.controller_cluster_role_binding.subjects,
            &controller,
            ns,
        );
        if let Some(pod) = deployment_pod(&mut self.controller_deployment) {
            pod.service_account_name = Some(controller);
        }
    }
}

impl ManifestSet for SchedulerManifests {
    type Options = SchedulerOptions;

    fn render(&self, opts: &SchedulerOptions) -> Result<Self> {
        let mut out = self.clone();

        let ns = opts
            .namespace
            .clone()
            .or_else(|| self.namespace().map(String::from))
            .unwrap_or_else(|| DEFAULT_SCHEDULER_NAMESPACE.to_string());
        out.network_policies = if opts.network_policies {
            network_policies(&ns)?
        } else {
            Vec::new()
        };
        out.propagate_namespace(&ns);

        let defaults = Images::default();
        let pick = |image: &Option<String>, default: String| {
            let image = image.clone().unwrap_or(default);
            match opts.mirror_revision {
                Some(rev) => mirror(&image, rev),
                None => image,
            }
        };
        let scheduler_image = pick(&opts.image, defaults.scheduler_plugin);
        let controller_image = pick(&opts.controller_image, defaults.scheduler_controller);

        let (resource_namespace, resource_name) = match &opts.leader_election_resource {
            Some(r) => (r.namespace.clone(), r.name.clone()),
            None => (ns.clone(), opts.profile_name.clone()),
        };
        let params = SchedulerConfigParams {
            api_version: self.config_api_version,
            profile_name: &opts.profile_name,
            cache_resync_period: opts.cache_resync_period,
            scoring_strategy: opts.scoring_strategy,
            leader_elect: opts.leader_election(),
            resource_namespace: &resource_namespace,
            resource_name: &resource_name,
        };
        let config = match opts.config_data.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(user) => schedconfig::render_config(user, &params, false)?,
            None => schedconfig::render_config(assets::get("sched/config.yaml")?, &params, true)?,
        };
        set_data(&mut out.config_map, CONFIG_KEY, config);

        // 0 means one replica per control-plane node, resolved by the caller
        let replicas = opts.replicas.max(1);
        if let Some(spec) = out.deployment.spec.as_mut() {
            spec.replicas = Some(replicas);
        }

        let pod = pod_spec_mut(
            deployment_pod(&mut out.deployment),
            "Deployment topo-aware-scheduler",
        )?;
        {
            let container =
                container_mut(pod, "Deployment topo-aware-scheduler", SCHEDULER_CONTAINER)?;
            set_image(container, &scheduler_image, opts.pull_policy);
            let args = args_mut(container);
            set_flag_value(args, "--config", CONFIG_PATH);
            set_flag_value(args, "--v", &opts.verbose.to_string());
        }
        let label = control_plane_label(self.platform).filter(|_| opts.ctrl_plane_affinity);
        pin_to_control_plane(pod, label);

        let controller_pod = pod_spec_mut(
            deployment_pod(&mut out.controller_deployment),
            "Deployment topo-aware-controller",
        )?;
        let container = container_mut(
            controller_pod,
            "Deployment topo-aware-controller",
            CONTROLLER_CONTAINER,
        )?;
        set_image(container, &controller_image, opts.pull_policy);

        Ok(out)
    }

    fn objects(&self) -> Result<Vec<DynamicObject>> {
        let mut objs = vec![
            to_dynamic(&self.namespace)?,
            to_dynamic(&self.service_account)?,
            to_dynamic(&self.controller_service_account)?,
            to_dynamic(&self.cluster_role)?,
            to_dynamic(&self.controller_cluster_role)?,
            to_dynamic(&self.cluster_role_binding_kube_scheduler)?,
            to_dynamic(&self.cluster_role_binding)?,
            to_dynamic(&self.controller_cluster_role_binding)?,
            to_dynamic(&self.role)?,
            to_dynamic(&self.role_binding)?,
            to_dynamic(&self.config_map)?,
        ];
        for policy in &self.network_policies {
            objs.push(to_dynamic(policy)?);
        }
        objs.push(to_dynamic(&self.controller_deployment)?);
        objs.push(to_dynamic(&self.deployment)?);
        Ok(objs)
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.metadata.name.as_deref()
    }
}
