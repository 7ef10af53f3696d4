//! NFD topology updater manifests

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::DynamicObject;
use tasdeploy_core::args::set_flag_value;
use tasdeploy_core::{Images, Platform, PlatformVersion, UpdaterOptions, mirror};

use crate::DEFAULT_UPDATER_NAMESPACE;
use crate::assets;
use crate::error::Result;
use crate::objects::{ManifestSet, to_dynamic};
use crate::render::{
    args_mut, bind_service_account, container_mut, duration_flag, ensure_known,
    network_policies, pod_spec_mut, set_image, set_namespace, set_node_selector,
    tolerate_control_plane,
};

const CONTAINER: &str = "nfd-topology-updater";

#[derive(Debug, Clone)]
pub struct NfdManifests {
    pub namespace: Namespace,
    pub service_account: ServiceAccount,
    pub cluster_role: ClusterRole,
    pub cluster_role_binding: ClusterRoleBinding,
    pub daemon_set: DaemonSet,
    pub network_policies: Vec<NetworkPolicy>,
}

impl NfdManifests {
    pub fn load(
        platform: Platform,
        _version: &PlatformVersion,
        namespace: Option<&str>,
    ) -> Result<Self> {
        ensure_known(platform)?;
        let mut set = Self {
            namespace: assets::load("nfd/namespace.yaml")?,
            service_account: assets::load("nfd/serviceaccount.yaml")?,
            cluster_role: assets::load("nfd/clusterrole.yaml")?,
            cluster_role_binding: assets::load("nfd/clusterrolebinding.yaml")?,
            daemon_set: assets::load("nfd/daemonset.yaml")?,
            network_policies: Vec::new(),
        };
        set.propagate_namespace(namespace.unwrap_or(DEFAULT_UPDATER_NAMESPACE));
        Ok(set)
    }

    fn propagate_namespace(&mut self, ns: &str) {
        self.namespace.metadata.name = Some(ns.to_string());
        set_namespace(&mut self.service_account.metadata, ns);
        set_namespace(&mut self.daemon_set.metadata, ns);
        for policy in &mut self.network_policies {
            set_namespace(&mut policy.metadata, ns);
        }

        let account = self
            .service_account
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| CONTAINER.to_string());
        bind_service_account(&mut self.cluster_role_binding.subjects, &account, ns);
        if let Some(pod) = self
            .daemon_set
            .spec
            .as_mut()
            .and_then(|s| s.template.spec.as_mut())
        {
            pod.service_account_name = Some(account);
        }
    }
}

impl ManifestSet for NfdManifests {
    type Options = UpdaterOptions;

    fn render(&self, opts: &UpdaterOptions) -> Result<Self> {
        let mut out = self.clone();

        let ns = opts
            .namespace
            .clone()
            .or_else(|| self.namespace().map(String::from))
            .unwrap_or_else(|| DEFAULT_UPDATER_NAMESPACE.to_string());
        out.network_policies = if opts.network_policies {
            network_policies(&ns)?
        } else {
            Vec::new()
        };
        out.propagate_namespace(&ns);

        let image = opts
            .image
            .clone()
            .unwrap_or_else(|| Images::default().topology_updater);
        let image = match opts.mirror_revision {
            Some(rev) => mirror(&image, rev),
            None => image,
        };

        let pod = pod_spec_mut(
            out.daemon_set
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut()),
            "DaemonSet nfd-topology-updater",
        )?;
        {
            let container = container_mut(pod, "DaemonSet nfd-topology-updater", CONTAINER)?;
            set_image(container, &image, opts.pull_policy);

            // NFD takes single dash Go flags
            let args = args_mut(container);
            set_flag_value(args, "-sleep-interval", &duration_flag(opts.sync_period));
            set_flag_value(args, "-v", &opts.verbose.to_string());
        }

        set_node_selector(pod, &opts.node_selector);
        tolerate_control_plane(pod, opts.ctrl_plane_tolerations);

        Ok(out)
    }

    fn objects(&self) -> Result<Vec<DynamicObject>> {
        let mut objs = vec![
            to_dynamic(&self.namespace)?,
            to_dynamic(&self.service_account)?,
            to_dynamic(&self.cluster_role)?,
            to_dynamic(&self.cluster_role_binding)?,
        ];
        for policy in &self.network_policies {
            objs.push(to_dynamic(policy)?);
        }
        objs.push(to_dynamic(&self.daemon_set)?);
        Ok(objs)
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.metadata.name.as_deref()
    }
}
