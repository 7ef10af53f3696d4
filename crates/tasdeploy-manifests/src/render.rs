//! Rendering rules shared by the manifest sets

use k8s_openapi::api::core::v1::{ConfigMap, Container, PodSpec, Toleration};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::Subject;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::time::Duration;
use tasdeploy_core::{Platform, PullPolicy};

use crate::assets;
use crate::error::{ManifestError, Result};

const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";
const MASTER_LABEL: &str = "node-role.kubernetes.io/master";

pub(crate) fn ensure_known(platform: Platform) -> Result<()> {
    if platform.is_known() {
        Ok(())
    } else {
        Err(ManifestError::UnsupportedPlatform(platform.to_string()))
    }
}

pub(crate) fn set_namespace(meta: &mut ObjectMeta, namespace: &str) {
    meta.namespace = Some(namespace.to_string());
}

/// Point every ServiceAccount subject at `account` in `namespace`
pub(crate) fn bind_service_account(
    subjects: &mut Option<Vec<Subject>>,
    account: &str,
    namespace: &str,
) {
    for subject in subjects.iter_mut().flatten() {
        if subject.kind == "ServiceAccount" {
            subject.name = account.to_string();
            subject.namespace = Some(namespace.to_string());
        }
    }
}

pub(crate) fn pod_spec_mut<'a>(
    template: Option<&'a mut PodSpec>,
    object: &str,
) -> Result<&'a mut PodSpec> {
    template.ok_or_else(|| ManifestError::MissingContainer {
        object: object.to_string(),
        container: "<pod spec>".to_string(),
    })
}

pub(crate) fn container_mut<'a>(
    pod: &'a mut PodSpec,
    object: &str,
    container: &str,
) -> Result<&'a mut Container> {
    pod.containers
        .iter_mut()
        .find(|c| c.name == container)
        .ok_or_else(|| ManifestError::MissingContainer {
            object: object.to_string(),
            container: container.to_string(),
        })
}

pub(crate) fn set_image(container: &mut Container, image: &str, pull_policy: PullPolicy) {
    container.image = Some(image.to_string());
    container.image_pull_policy = Some(pull_policy.as_str().to_string());
}

pub(crate) fn args_mut(container: &mut Container) -> &mut Vec<String> {
    container.args.get_or_insert_with(Vec::new)
}

pub(crate) fn set_data(cm: &mut ConfigMap, key: &str, value: String) {
    cm.data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), value);
}

/// Set `key` when `value` is given, drop it otherwise
pub(crate) fn set_or_remove_data(cm: &mut ConfigMap, key: &str, value: Option<String>) {
    match value {
        Some(value) => set_data(cm, key, value),
        None => {
            if let Some(data) = cm.data.as_mut() {
                data.remove(key);
            }
        }
    }
}

/// Parse a user supplied YAML document, which must be a mapping
pub(crate) fn validate_yaml_mapping(what: &str, raw: &str) -> Result<()> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| ManifestError::InvalidPayload {
            what: what.to_string(),
            reason: e.to_string(),
        })?;
    if value.is_mapping() {
        Ok(())
    } else {
        Err(ManifestError::InvalidPayload {
            what: what.to_string(),
            reason: "expected a YAML mapping".to_string(),
        })
    }
}

/// Duration as a Go style flag value (`10s`, `500ms`)
pub(crate) fn duration_flag(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

/// Node label marking control-plane nodes, `None` when the control plane is not
/// schedulable (hosted control planes)
pub(crate) fn control_plane_label(platform: Platform) -> Option<&'static str> {
    match platform {
        Platform::OpenShift => Some(MASTER_LABEL),
        Platform::Kubernetes | Platform::MicroShift => Some(CONTROL_PLANE_LABEL),
        Platform::HyperShift | Platform::Unknown => None,
    }
}

fn control_plane_toleration(key: &str) -> Toleration {
    Toleration {
        key: Some(key.to_string()),
        operator: Some("Exists".to_string()),
        effect: Some("NoSchedule".to_string()),
        ..Default::default()
    }
}

/// Add or drop the `NoSchedule` tolerations for the control-plane taints
///
/// Other tolerations are left alone. Adding never duplicates.
pub(crate) fn tolerate_control_plane(pod: &mut PodSpec, enabled: bool) {
    let owned = [CONTROL_PLANE_LABEL, MASTER_LABEL].map(control_plane_toleration);
    let mut tolerations = pod.tolerations.take().unwrap_or_default();
    tolerations.retain(|t| !owned.contains(t));
    if enabled {
        tolerations.extend(owned);
    }
    pod.tolerations = (!tolerations.is_empty()).then_some(tolerations);
}

/// Pin the pod to control-plane nodes labelled `label`, or unpin it on `None`
pub(crate) fn pin_to_control_plane(pod: &mut PodSpec, label: Option<&str>) {
    let mut selector = pod.node_selector.take().unwrap_or_default();
    selector.remove(CONTROL_PLANE_LABEL);
    selector.remove(MASTER_LABEL);
    if let Some(label) = label {
        selector.insert(label.to_string(), String::new());
    }
    pod.node_selector = (!selector.is_empty()).then_some(selector);
    tolerate_control_plane(pod, label.is_some());
}

/// Replace the node selector with `labels`; templates ship without one
pub(crate) fn set_node_selector(pod: &mut PodSpec, labels: &BTreeMap<String, String>) {
    pod.node_selector = (!labels.is_empty()).then(|| labels.clone());
}

/// Default-deny plus API server egress policies for `namespace`
pub(crate) fn network_policies(namespace: &str) -> Result<Vec<NetworkPolicy>> {
    let mut policies: Vec<NetworkPolicy> = vec![
        assets::load("common/networkpolicy-default-deny.yaml")?,
        assets::load("common/networkpolicy-apiserver.yaml")?,
    ];
    for policy in &mut policies {
        set_namespace(&mut policy.metadata, namespace);
    }
    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerations_are_idempotent() {
        let mut pod = PodSpec::default();
        tolerate_control_plane(&mut pod, true);
        tolerate_control_plane(&mut pod, true);
        assert_eq!(pod.tolerations.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn test_tolerations_off_keeps_foreign_entries() {
        let gpu = Toleration {
            key: Some("nvidia.com/gpu".to_string()),
            operator: Some("Exists".to_string()),
            ..Default::default()
        };
        let mut pod = PodSpec {
            tolerations: Some(vec![gpu.clone()]),
            ..Default::default()
        };
        tolerate_control_plane(&mut pod, true);
        assert_eq!(pod.tolerations.as_ref().map(Vec::len), Some(3));

        tolerate_control_plane(&mut pod, false);
        assert_eq!(pod.tolerations, Some(vec![gpu]));

        let mut bare = PodSpec::default();
        tolerate_control_plane(&mut bare, false);
        assert!(bare.tolerations.is_none());
    }

    #[test]
    fn test_pin_and_unpin_control_plane() {
        let mut pod = PodSpec::default();
        pin_to_control_plane(&mut pod, Some(MASTER_LABEL));
        assert!(pod.node_selector.as_ref().unwrap().contains_key(MASTER_LABEL));
        assert_eq!(pod.tolerations.as_ref().map(Vec::len), Some(2));

        pin_to_control_plane(&mut pod, None);
        assert_eq!(pod, PodSpec::default());
    }

    #[test]
    fn test_set_or_remove_data() {
        let mut cm = ConfigMap::default();
        set_or_remove_data(&mut cm, "a", Some("1".to_string()));
        set_or_remove_data(&mut cm, "b", Some("2".to_string()));
        set_or_remove_data(&mut cm, "a", None);
        let keys: Vec<&String> = cm.data.as_ref().unwrap().keys().collect();
        assert_eq!(keys, vec!["b"]);
    }

    #[test]
    fn test_control_plane_label_per_platform() {
        assert_eq!(control_plane_label(Platform::OpenShift), Some(MASTER_LABEL));
        assert_eq!(control_plane_label(Platform::Kubernetes), Some(CONTROL_PLANE_LABEL));
        assert_eq!(control_plane_label(Platform::MicroShift), Some(CONTROL_PLANE_LABEL));
        assert_eq!(control_plane_label(Platform::HyperShift), None);
    }

    #[test]
    fn test_duration_flag() {
        assert_eq!(duration_flag(Duration::from_secs(10)), "10s");
        assert_eq!(duration_flag(Duration::from_millis(1500)), "1500ms");
    }

    #[test]
    fn test_validate_yaml_mapping() {
        assert!(validate_yaml_mapping("config", "a: 1").is_ok());
        assert!(validate_yaml_mapping("config", "- a").is_err());
        assert!(validate_yaml_mapping("config", "a: [").is_err());
    }

    #[test]
    fn test_network_policies_namespace() {
        let policies = network_policies("ns1").unwrap();
        assert_eq!(policies.len(), 2);
        assert!(
            policies
                .iter()
                .all(|p| p.metadata.namespace.as_deref() == Some("ns1"))
        );
    }

    #[test]
    fn test_bind_service_account() {
        let mut subjects = Some(vec![
            Subject {
                kind: "ServiceAccount".to_string(),
                name: "old".to_string(),
                namespace: Some("old-ns".to_string()),
                ..Default::default()
            },
            Subject {
                kind: "Group".to_string(),
                name: "system:nodes".to_string(),
                ..Default::default()
            },
        ]);
        bind_service_account(&mut subjects, "sa", "ns");
        let subjects = subjects.unwrap();
        assert_eq!(subjects[0].name, "sa");
        assert_eq!(subjects[0].namespace.as_deref(), Some("ns"));
        assert_eq!(subjects[1].name, "system:nodes");
    }
}
