//! Cluster configuration checks required by topology-aware scheduling
//!
//! Worker kubelets must run the static CPU manager and a NUMA-aligning
//! topology manager policy. The static memory manager is recommended but
//! only reported as a warning.

use serde::Serialize;
use serde_json::Value;
use tasdeploy_core::{Platform, PlatformVersion};
use tracing::{debug, warn};

use crate::client::{ClusterClient, ListSelector};
use crate::detect::{CONTROL_PLANE_LABELS, ClusterTarget};
use crate::error::Result;

const TOPOLOGY_POLICIES: [&str; 2] = ["single-numa-node", "restricted"];

/// How much a failed check matters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A failed check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Node the check ran on, `None` for cluster-wide checks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub area: String,
    pub setting: String,
    pub expected: String,
    pub detected: String,
    pub severity: Severity,
}

/// Every failed check of a validation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub results: Vec<ValidationResult>,
    /// Nodes whose kubelet configuration was inspected
    pub nodes: Vec<String>,
}

impl ValidationReport {
    /// No error-level result; warnings do not fail validation
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.severity != Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.severity == Severity::Warning)
    }
}

/// Lowest platform version the scheduler plugin works with
pub fn minimum_version(platform: Platform) -> PlatformVersion {
    match platform {
        Platform::Kubernetes | Platform::Unknown => PlatformVersion::new(1, 23),
        Platform::OpenShift | Platform::HyperShift | Platform::MicroShift => {
            PlatformVersion::new(4, 11)
        }
    }
}

fn check_version(target: &ClusterTarget) -> Option<ValidationResult> {
    let min = minimum_version(target.platform.discovered);
    let version = &target.version.discovered;
    (!version.at_least(&min)).then(|| ValidationResult {
        node: None,
        area: "platform".to_string(),
        setting: format!("{} version", target.platform.discovered),
        expected: format!(">= {}", min),
        detected: version.to_string(),
        severity: Severity::Error,
    })
}

/// Check one kubelet configuration, as served by `/configz`
pub fn check_kubelet_config(node: &str, config: &Value) -> Vec<ValidationResult> {
    let setting = |key: &str| config[key].as_str().unwrap_or("").to_string();
    let result = |setting: &str, expected: &str, detected: String, severity| ValidationResult {
        node: Some(node.to_string()),
        area: "kubelet".to_string(),
        setting: setting.to_string(),
        expected: expected.to_string(),
        detected: if detected.is_empty() {
            "unset".to_string()
        } else {
            detected
        },
        severity,
    };

    let mut results = Vec::new();

    let cpu = setting("cpuManagerPolicy");
    if cpu != "static" {
        results.push(result("cpuManagerPolicy", "static", cpu, Severity::Error));
    }

    let topology = setting("topologyManagerPolicy");
    if !TOPOLOGY_POLICIES.contains(&topology.as_str()) {
        results.push(result(
            "topologyManagerPolicy",
            &TOPOLOGY_POLICIES.join(" or "),
            topology,
            Severity::Error,
        ));
    }

    let memory = setting("memoryManagerPolicy");
    if memory != "Static" {
        results.push(result("memoryManagerPolicy", "Static", memory, Severity::Warning));
    }

    results
}

fn is_control_plane(node: &kube::api::DynamicObject) -> bool {
    node.metadata
        .labels
        .as_ref()
        .is_some_and(|l| CONTROL_PLANE_LABELS.iter().any(|k| l.contains_key(*k)))
}

/// Names of the nodes whose kubelets run workloads
///
/// Control-plane nodes are left out unless there is nothing else, as on
/// single-node clusters.
async fn worker_nodes(client: &dyn ClusterClient) -> Result<Vec<String>> {
    let nodes = client.list(&ListSelector::new("v1", "Node")).await?;
    let workers: Vec<String> = nodes
        .iter()
        .filter(|n| !is_control_plane(n))
        .filter_map(|n| n.metadata.name.clone())
        .collect();
    if !workers.is_empty() {
        return Ok(workers);
    }
    Ok(nodes.into_iter().filter_map(|n| n.metadata.name).collect())
}

/// Run every check against the cluster
///
/// A node whose configuration cannot be read yields an error-level result;
/// only a failure to list nodes aborts the run.
pub async fn validate_cluster(
    client: &dyn ClusterClient,
    target: &ClusterTarget,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    report.results.extend(check_version(target));

    let nodes = worker_nodes(client).await?;
    if nodes.is_empty() {
        report.results.push(ValidationResult {
            node: None,
            area: "nodes".to_string(),
            setting: "worker nodes".to_string(),
            expected: "at least one".to_string(),
            detected: "none".to_string(),
            severity: Severity::Error,
        });
    }

    for node in &nodes {
        match client.kubelet_config(node).await {
            Ok(config) => {
                let results = check_kubelet_config(node, &config);
                debug!(node = %node, failed = results.len(), "kubelet configuration checked");
                report.results.extend(results);
            }
            Err(e) => {
                warn!(node = %node, error = %e, "kubelet configuration unavailable");
                report.results.push(ValidationResult {
                    node: Some(node.clone()),
                    area: "kubelet".to_string(),
                    setting: "configz".to_string(),
                    expected: "readable".to_string(),
                    detected: e.to_string(),
                    severity: Severity::Error,
                });
            }
        }
    }

    report.nodes = nodes;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClusterClient;
    use crate::mock::fixtures::object;
    use serde_json::json;

    fn good_config() -> Value {
        json!({
            "cpuManagerPolicy": "static",
            "topologyManagerPolicy": "single-numa-node",
            "memoryManagerPolicy": "Static",
        })
    }

    fn target(spec: &str) -> ClusterTarget {
        let (platform, version) = spec.split_once(':').unwrap();
        ClusterTarget::user_supplied(platform.parse().unwrap(), version.parse().unwrap())
    }

    #[test]
    fn test_good_kubelet_config() {
        assert!(check_kubelet_config("worker-0", &good_config()).is_empty());
        let restricted = json!({
            "cpuManagerPolicy": "static",
            "topologyManagerPolicy": "restricted",
            "memoryManagerPolicy": "Static",
        });
        assert!(check_kubelet_config("worker-0", &restricted).is_empty());
    }

    #[test]
    fn test_bad_kubelet_config() {
        let results = check_kubelet_config("worker-0", &json!({"cpuManagerPolicy": "none"}));
        let settings: Vec<&str> = results.iter().map(|r| r.setting.as_str()).collect();
        assert_eq!(
            settings,
            vec!["cpuManagerPolicy", "topologyManagerPolicy", "memoryManagerPolicy"]
        );
        assert_eq!(results[0].detected, "none");
        assert_eq!(results[1].detected, "unset");
        assert_eq!(results[2].severity, Severity::Warning);
    }

    #[test]
    fn test_memory_manager_is_warning_only() {
        let config = json!({
            "cpuManagerPolicy": "static",
            "topologyManagerPolicy": "single-numa-node",
        });
        let report = ValidationReport {
            results: check_kubelet_config("worker-0", &config),
            nodes: vec!["worker-0".to_string()],
        };
        assert!(report.is_success());
        assert_eq!(report.warnings().count(), 1);
    }

    #[test]
    fn test_minimum_version() {
        assert!(check_version(&target("kubernetes:1.23")).is_none());
        assert!(check_version(&target("kubernetes:1.22")).is_some());
        assert!(check_version(&target("openshift:4.11")).is_none());
        let old = check_version(&target("openshift:4.10")).unwrap();
        insta::assert_snapshot!(old.expected, @">= v4.11");
    }

    #[tokio::test]
    async fn test_validate_skips_control_plane() {
        let client = MockClusterClient::with_objects(vec![
            object("v1", "Node", None, "master-0", &[("node-role.kubernetes.io/master", "")]),
            object("v1", "Node", None, "worker-0", &[]),
        ])
        .with_kubelet_config("worker-0", good_config());

        let report = validate_cluster(&client, &target("openshift:4.14")).await.unwrap();

        assert_eq!(report.nodes, vec!["worker-0"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_validate_single_node_cluster() {
        let client = MockClusterClient::with_objects(vec![object(
            "v1",
            "Node",
            None,
            "sno",
            &[("node-role.kubernetes.io/control-plane", "")],
        )])
        .with_kubelet_config("sno", good_config());

        let report = validate_cluster(&client, &target("kubernetes:1.29")).await.unwrap();
        assert_eq!(report.nodes, vec!["sno"]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_validate_unreadable_node_fails() {
        let client = MockClusterClient::with_objects(vec![
            object("v1", "Node", None, "worker-0", &[]),
            object("v1", "Node", None, "worker-1", &[]),
        ])
        .with_kubelet_config("worker-0", good_config());

        let report = validate_cluster(&client, &target("kubernetes:1.29")).await.unwrap();

        assert!(!report.is_success());
        let failed: Vec<_> = report.errors().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].node.as_deref(), Some("worker-1"));
        assert_eq!(failed[0].setting, "configz");
    }

    #[tokio::test]
    async fn test_validate_no_nodes() {
        let client = MockClusterClient::new();
        let report = validate_cluster(&client, &target("kubernetes:1.29")).await.unwrap();
        assert!(!report.is_success());
        assert_eq!(report.results[0].area, "nodes");
    }

    #[test]
    fn test_report_json() {
        let report = ValidationReport {
            results: check_kubelet_config(
                "w",
                &json!({"cpuManagerPolicy": "static", "topologyManagerPolicy": "restricted"}),
            ),
            nodes: vec!["w".to_string()],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["severity"], "warning");
        assert_eq!(json["results"][0]["node"], "w");
    }
}
