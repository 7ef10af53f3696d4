//! resource-topology-exporter manifests

use k8s_openapi::api::apps::v1::DaemonSet;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Namespace, SELinuxOptions, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::DynamicObject;
use serde_json::json;
use tasdeploy_core::args::{set_flag_value, toggle_flag, unset_flag};
use tasdeploy_core::{Images, Platform, PlatformVersion, UpdaterOptions, mirror};

use crate::DEFAULT_UPDATER_NAMESPACE;
use crate::assets;
use crate::error::Result;
use crate::objects::{ManifestSet, to_dynamic};
use crate::render::{
    args_mut, bind_service_account, container_mut, duration_flag, ensure_known, network_policies,
    pod_spec_mut, set_image, set_namespace, set_node_selector, set_or_remove_data,
    tolerate_control_plane, validate_yaml_mapping,
};
use crate::templates::{self, NOTIFY_FILE, SelinuxPolicy};

/// ConfigMap key holding the exporter configuration
pub const CONFIG_KEY: &str = "config.yaml";

/// ConfigMap key holding the notifier OCI hook definition
pub const HOOK_JSON_KEY: &str = "notifier-hook.json";

/// ConfigMap key holding the notifier script
pub const HOOK_SCRIPT_KEY: &str = "notifier.sh";

/// ConfigMap key holding the exporter SELinux policy module
pub const SELINUX_POLICY_KEY: &str = "selinux-policy.cil";

const CONTAINER: &str = "resource-topology-exporter";

#[derive(Debug, Clone)]
pub struct RteManifests {
    pub namespace: Namespace,
    pub service_account: ServiceAccount,
    pub cluster_role: ClusterRole,
    pub cluster_role_binding: ClusterRoleBinding,
    pub config_map: ConfigMap,
    pub daemon_set: DaemonSet,
    /// SecurityContextConstraints granting host access, OpenShift family only
    pub scc: Option<DynamicObject>,
    /// Installs the exporter SELinux policy on the nodes, OpenShift only
    pub machine_config: Option<DynamicObject>,
    pub network_policies: Vec<NetworkPolicy>,
}

impl RteManifests {
    pub fn load(
        platform: Platform,
        _version: &PlatformVersion,
        namespace: Option<&str>,
    ) -> Result<Self> {
        ensure_known(platform)?;

        let scc = if platform.is_openshift_like() {
            Some(assets::load_dynamic("rte/scc.yaml")?)
        } else {
            None
        };

        // Hosted control planes manage node configuration out of cluster
        let machine_config = if platform == Platform::OpenShift {
            Some(assets::load_dynamic("rte/machineconfig.yaml")?)
        } else {
            None
        };

        let mut set = Self {
            namespace: assets::load("rte/namespace.yaml")?,
            service_account: assets::load("rte/serviceaccount.yaml")?,
            cluster_role: assets::load("rte/clusterrole.yaml")?,
            cluster_role_binding: assets::load("rte/clusterrolebinding.yaml")?,
            config_map: assets::load("rte/configmap.yaml")?,
            daemon_set: assets::load("rte/daemonset.yaml")?,
            scc,
            machine_config,
            network_policies: Vec::new(),
        };
        set.propagate_namespace(namespace.unwrap_or(DEFAULT_UPDATER_NAMESPACE));
        Ok(set)
    }

    fn propagate_namespace(&mut self, ns: &str) {
        self.namespace.metadata.name = Some(ns.to_string());
        set_namespace(&mut self.service_account.metadata, ns);
        set_namespace(&mut self.config_map.metadata, ns);
        set_namespace(&mut self.daemon_set.metadata, ns);
        for policy in &mut self.network_policies {
            set_namespace(&mut policy.metadata, ns);
        }

        let account = self
            .service_account
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| "rte".to_string());
        bind_service_account(&mut self.cluster_role_binding.subjects, &account, ns);
        if let Some(data) = self.scc.as_mut().and_then(|scc| scc.data.as_object_mut()) {
            data.insert(
                "users".to_string(),
                json!([format!("system:serviceaccount:{}:{}", ns, account)]),
            );
        }
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

fn run_as_selinux_type(container: &mut Container, policy: &SelinuxPolicy) {
    let context = container.security_context.get_or_insert_with(Default::default);
    context.se_linux_options = Some(SELinuxOptions {
        type_: Some(policy.process_type()),
        ..Default::default()
    });
}

impl ManifestSet for RteManifests {
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
            .unwrap_or_else(|| Images::default().resource_topology_exporter);
        let image = match opts.mirror_revision {
            Some(rev) => mirror(&image, rev),
            None => image,
        };

        let config = opts.config_data.as_deref().filter(|c| !c.trim().is_empty());
        if let Some(cfg) = config {
            validate_yaml_mapping("exporter configuration", cfg)?;
        }
        set_or_remove_data(&mut out.config_map, CONFIG_KEY, config.map(String::from));

        let hook = if opts.notifier {
            Some(templates::render_notifier(NOTIFY_FILE)?)
        } else {
            None
        };
        let (hook_json, hook_script) = hook.map(|h| (h.hook_json, h.script)).unzip();
        set_or_remove_data(&mut out.config_map, HOOK_JSON_KEY, hook_json);
        set_or_remove_data(&mut out.config_map, HOOK_SCRIPT_KEY, hook_script);

        let selinux = match out.machine_config.as_mut() {
            Some(mc) => {
                let policy = templates::render_selinux_policy()?;
                if let Some(source) = mc
                    .data
                    .pointer_mut("/spec/config/storage/files/0/contents/source")
                {
                    *source = json!(policy.source);
                }
                Some(policy)
            }
            None => None,
        };
        set_or_remove_data(
            &mut out.config_map,
            SELINUX_POLICY_KEY,
            selinux.as_ref().map(|p| p.cil.clone()),
        );
        if let (Some(scc), Some(policy)) = (out.scc.as_mut(), &selinux) {
            scc.data["seLinuxContext"]["seLinuxOptions"]["type"] = json!(policy.process_type());
        }

        let pod = pod_spec_mut(
            out.daemon_set
                .spec
                .as_mut()
                .and_then(|s| s.template.spec.as_mut()),
            "DaemonSet resource-topology-exporter",
        )?;
        {
            let container = container_mut(pod, "DaemonSet resource-topology-exporter", CONTAINER)?;
            set_image(container, &image, opts.pull_policy);

            if let Some(policy) = &selinux {
                run_as_selinux_type(container, policy);
            }

            let args = args_mut(container);
            set_flag_value(args, "--sleep-interval", &duration_flag(opts.sync_period));
            set_flag_value(args, "--v", &opts.verbose.to_string());
            toggle_flag(args, "--pods-fingerprint", opts.pods_fingerprint);
            if opts.notifier {
                set_flag_value(args, "--notify-file", NOTIFY_FILE);
            } else {
                unset_flag(args, "--notify-file");
            }
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
        if let Some(scc) = &self.scc {
            objs.push(scc.clone());
        }
        if let Some(mc) = &self.machine_config {
            objs.push(mc.clone());
        }
        objs.push(to_dynamic(&self.config_map)?);
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
