//! Ordered creation and removal of rendered objects
//!
//! Creation order: CRDs, namespaces, RBAC and security policy, config,
//! network policy, then workloads. Within a category, declaration order is
//! kept, so a manifest set lists its primary workload last.
//!
//! Removal walks workloads first (primary first), then supporting objects,
//! then namespaces. Namespaced objects whose namespace is removed in the
//! same plan are left to the namespace deletion.
//!
//! Workloads are followed by their pods: created workloads wait for their
//! pods to run, removed ones for their pods to go. A MachineConfig waits for
//! its pool to finish rolling it out.

use kube::ResourceExt;
use kube::api::DynamicObject;
use std::collections::HashSet;
use tasdeploy_manifests::{ManifestSet, object_display};
use tracing::{info, warn};

use crate::client::{ClusterClient, ObjectKey};
use crate::error::{KubeError, RemovalFailure, Result};
use crate::wait::{WaitFor, WaitOptions, wait_for};

const MACHINE_CONFIG_ROLE_LABEL: &str = "machineconfiguration.openshift.io/role";

/// Resource categories in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceCategory {
    /// CustomResourceDefinition - installed first
    Crd = 0,
    /// Namespace - created before namespace-scoped resources
    Namespace = 1,
    /// ClusterRole, ClusterRoleBinding
    ClusterRbac = 10,
    /// Role, RoleBinding, ServiceAccount
    NamespacedRbac = 11,
    /// SecurityContextConstraints and MachineConfig, which must be in place
    /// before pods are admitted
    SecurityPolicy = 15,
    /// ConfigMap, Secret
    Config = 20,
    /// NetworkPolicy, Service
    Network = 30,
    /// Deployment, DaemonSet
    Workload = 40,
    /// Everything else
    Other = 100,
}

impl ResourceCategory {
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "CustomResourceDefinition" => Self::Crd,
            "Namespace" => Self::Namespace,
            "ClusterRole" | "ClusterRoleBinding" => Self::ClusterRbac,
            "Role" | "RoleBinding" | "ServiceAccount" => Self::NamespacedRbac,
            "SecurityContextConstraints" | "MachineConfig" => Self::SecurityPolicy,
            "ConfigMap" | "Secret" => Self::Config,
            "NetworkPolicy" | "Service" => Self::Network,
            "Deployment" | "StatefulSet" | "DaemonSet" => Self::Workload,
            _ => Self::Other,
        }
    }
}

/// An object submission with an optional readiness or absence check
#[derive(Debug, Clone)]
pub struct WaitableObject {
    pub object: DynamicObject,
    pub key: ObjectKey,
    pub wait: Option<WaitFor>,
    /// Checks run after `wait`, each against its own key
    pub follow_up: Vec<(ObjectKey, WaitFor)>,
}

impl WaitableObject {
    fn new(object: DynamicObject) -> Result<Self> {
        let key = ObjectKey::from_object(&object)?;
        Ok(Self {
            object,
            key,
            wait: None,
            follow_up: Vec::new(),
        })
    }

    pub fn category(&self) -> ResourceCategory {
        ResourceCategory::from_kind(&self.key.kind)
    }
}

/// Summary of apply/delete operations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSummary {
    /// Successfully processed objects
    pub succeeded: Vec<String>,
    /// Skipped objects with the reason
    pub skipped: Vec<(String, String)>,
}

impl OperationSummary {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let mut parts = Vec::with_capacity(2);
        if !self.succeeded.is_empty() {
            parts.push(format!("{} succeeded", self.succeeded.len()));
        }
        if !self.skipped.is_empty() {
            parts.push(format!("{} skipped", self.skipped.len()));
        }
        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn creation_wait(kind: &str) -> Option<WaitFor> {
    match kind {
        "CustomResourceDefinition" => Some(WaitFor::CrdEstablished),
        "Deployment" => Some(WaitFor::DeploymentComplete),
        "DaemonSet" => Some(WaitFor::DaemonSetReady),
        _ => None,
    }
}

/// Pods of a workload are named `<workload>-<suffix>`
fn pod_prefix(key: &ObjectKey) -> String {
    format!("{}-", key.name)
}

fn creation_follow_up(op: &WaitableObject) -> Vec<(ObjectKey, WaitFor)> {
    match (op.category(), &op.key.namespace) {
        (ResourceCategory::Workload, Some(namespace)) => vec![(
            op.key.clone(),
            WaitFor::PodsRunning {
                namespace: namespace.clone(),
                prefix: pod_prefix(&op.key),
            },
        )],
        _ if op.key.kind == "MachineConfig" => op
            .object
            .labels()
            .get(MACHINE_CONFIG_ROLE_LABEL)
            .map(|role| {
                let pool = ObjectKey::cluster(
                    "machineconfiguration.openshift.io/v1",
                    "MachineConfigPool",
                    role,
                );
                let rolled_out = WaitFor::MachineConfigPoolCondition {
                    condition: "Updated".to_string(),
                    machine_config: Some(op.key.name.clone()),
                };
                (pool, rolled_out)
            })
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

/// Order objects for creation and attach readiness checks
pub fn creation_plan(objects: Vec<DynamicObject>) -> Result<Vec<WaitableObject>> {
    let mut plan = objects
        .into_iter()
        .map(|obj| {
            let mut op = WaitableObject::new(obj)?;
            op.wait = creation_wait(&op.key.kind);
            op.follow_up = creation_follow_up(&op);
            Ok(op)
        })
        .collect::<Result<Vec<_>>>()?;
    plan.sort_by_key(WaitableObject::category);
    Ok(plan)
}

/// Order objects for removal and attach absence checks
pub fn deletion_plan(objects: Vec<DynamicObject>) -> Result<Vec<WaitableObject>> {
    let created = creation_plan(objects)?;

    let removed_namespaces: HashSet<String> = created
        .iter()
        .filter(|op| op.category() == ResourceCategory::Namespace)
        .map(|op| op.key.name.clone())
        .collect();

    let mut workloads = Vec::new();
    let mut supporting = Vec::new();
    let mut namespaces = Vec::new();
    for mut op in created.into_iter().rev() {
        op.follow_up.clear();
        match op.category() {
            ResourceCategory::Workload => {
                op.wait = Some(WaitFor::Gone);
                if let Some(namespace) = op.key.namespace.clone() {
                    let pods_gone = WaitFor::PodsGone {
                        namespace,
                        prefix: pod_prefix(&op.key),
                    };
                    op.follow_up.push((op.key.clone(), pods_gone));
                }
                workloads.push(op);
            }
            ResourceCategory::Namespace => {
                op.wait = Some(WaitFor::Gone);
                namespaces.push(op);
            }
            _ => {
                let covered = op
                    .key
                    .namespace
                    .as_ref()
                    .is_some_and(|ns| removed_namespaces.contains(ns));
                if !covered {
                    op.wait = (op.category() == ResourceCategory::Crd).then_some(WaitFor::Gone);
                    supporting.push(op);
                }
            }
        }
    }

    workloads.extend(supporting);
    workloads.extend(namespaces);
    Ok(workloads)
}

/// Creatable objects of a rendered manifest set
pub fn to_creatable_objects<M: ManifestSet>(set: &M) -> Result<Vec<WaitableObject>> {
    creation_plan(set.objects()?)
}

/// Deletable objects of a rendered manifest set
pub fn to_deletable_objects<M: ManifestSet>(set: &M) -> Result<Vec<WaitableObject>> {
    deletion_plan(set.objects()?)
}

/// Run the object's own check, then its follow-ups
async fn wait_for_object(
    client: &dyn ClusterClient,
    op: &WaitableObject,
    options: WaitOptions,
) -> Result<()> {
    if let Some(condition) = &op.wait {
        wait_for(client, &op.key, condition, options).await?;
    }
    for (key, condition) in &op.follow_up {
        wait_for(client, key, condition, options).await?;
    }
    Ok(())
}

/// Create every object in order, stopping at the first failure
///
/// Readiness checks run only when `wait` is given.
pub async fn apply_create(
    client: &dyn ClusterClient,
    ops: &[WaitableObject],
    wait: Option<WaitOptions>,
) -> Result<OperationSummary> {
    let mut summary = OperationSummary::default();

    for op in ops {
        let display = object_display(&op.object);
        client
            .create(&op.object)
            .await
            .map_err(|e| KubeError::Create {
                object: display.clone(),
                source: Box::new(e),
            })?;
        info!(kind = %op.key.kind, key = %op.key.namespaced_name(), "created");

        if let Some(options) = wait {
            wait_for_object(client, op, options).await?;
        }
        summary.succeeded.push(display);
    }

    Ok(summary)
}

/// Delete every object in order, continuing past failures
///
/// An object that is already gone counts as removed. When any step fails the
/// error lists every failed step.
pub async fn apply_delete(
    client: &dyn ClusterClient,
    ops: &[WaitableObject],
    wait: Option<WaitOptions>,
) -> Result<OperationSummary> {
    let mut summary = OperationSummary::default();
    let mut failures = Vec::new();

    for op in ops {
        let display = op.key.to_string();
        match client.delete(&op.key).await {
            Ok(()) => {
                info!(kind = %op.key.kind, key = %op.key.namespaced_name(), "deleted");
            }
            Err(e) if e.is_not_found() => {
                summary.skipped.push((display, "not found".to_string()));
                continue;
            }
            Err(e) => {
                warn!(
                    kind = %op.key.kind,
                    key = %op.key.namespaced_name(),
                    error = %e,
                    "delete failed"
                );
                failures.push(RemovalFailure {
                    component: None,
                    object: display,
                    message: e.to_string(),
                });
                continue;
            }
        }

        if let Some(options) = wait
            && let Err(e) = wait_for_object(client, op, options).await
        {
            warn!(
                kind = %op.key.kind,
                key = %op.key.namespaced_name(),
                error = %e,
                "removal wait failed"
            );
            failures.push(RemovalFailure {
                component: None,
                object: display,
                message: e.to_string(),
            });
            continue;
        }
        summary.succeeded.push(display);
    }

    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(KubeError::RemovalIncomplete { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::fixtures::object;
    use crate::mock::{MockClusterClient, MockOperation};
    use std::time::Duration;

    fn set() -> Vec<DynamicObject> {
        vec![
            object("v1", "Namespace", None, "ns", &[]),
            object("v1", "ServiceAccount", Some("ns"), "sa", &[]),
            object("rbac.authorization.k8s.io/v1", "ClusterRole", None, "cr", &[]),
            object("rbac.authorization.k8s.io/v1", "ClusterRoleBinding", None, "crb", &[]),
            object("v1", "ConfigMap", Some("ns"), "cfg", &[]),
            object("apps/v1", "Deployment", Some("ns"), "controller", &[]),
            object("apps/v1", "Deployment", Some("ns"), "primary", &[]),
            object("security.openshift.io/v1", "SecurityContextConstraints", None, "scc", &[]),
        ]
    }

    fn names(plan: &[WaitableObject]) -> Vec<&str> {
        plan.iter().map(|op| op.key.name.as_str()).collect()
    }

    fn fast() -> Option<WaitOptions> {
        Some(WaitOptions::new(
            Duration::from_millis(1),
            Duration::from_millis(50),
        ))
    }

    #[test]
    fn test_resource_category_ordering() {
        assert!(ResourceCategory::Crd < ResourceCategory::Namespace);
        assert!(ResourceCategory::Namespace < ResourceCategory::ClusterRbac);
        assert!(ResourceCategory::SecurityPolicy < ResourceCategory::Workload);
        assert!(ResourceCategory::Config < ResourceCategory::Workload);
    }

    #[test]
    fn test_creation_order() {
        let plan = creation_plan(set()).unwrap();
        assert_eq!(
            names(&plan),
            vec!["ns", "cr", "crb", "sa", "scc", "cfg", "controller", "primary"]
        );
        assert_eq!(plan[7].wait, Some(WaitFor::DeploymentComplete));
        assert_eq!(plan[0].wait, None);
        assert!(plan[0].follow_up.is_empty());
    }

    #[test]
    fn test_deletion_order() {
        let plan = deletion_plan(set()).unwrap();
        // namespaced supporting objects go away with their namespace
        assert_eq!(names(&plan), vec!["primary", "controller", "scc", "crb", "cr", "ns"]);
        assert_eq!(plan[0].wait, Some(WaitFor::Gone));
        assert_eq!(plan[5].wait, Some(WaitFor::Gone));
        assert_eq!(plan[2].wait, None);
    }

    #[test]
    fn test_workloads_are_followed_by_their_pods() {
        let primary = ObjectKey::namespaced("apps/v1", "Deployment", "ns", "primary");

        let create = creation_plan(set()).unwrap();
        assert_eq!(
            create[7].follow_up,
            vec![(
                primary.clone(),
                WaitFor::PodsRunning {
                    namespace: "ns".to_string(),
                    prefix: "primary-".to_string(),
                }
            )]
        );

        let delete = deletion_plan(set()).unwrap();
        assert_eq!(
            delete[0].follow_up,
            vec![(
                primary,
                WaitFor::PodsGone {
                    namespace: "ns".to_string(),
                    prefix: "primary-".to_string(),
                }
            )]
        );
        assert!(delete.iter().skip(2).all(|op| op.follow_up.is_empty()));
    }

    fn machine_config() -> DynamicObject {
        object(
            "machineconfiguration.openshift.io/v1",
            "MachineConfig",
            None,
            "51-rte-selinux",
            &[(MACHINE_CONFIG_ROLE_LABEL, "worker")],
        )
    }

    #[test]
    fn test_machine_config_waits_for_its_pool() {
        let mut objects = set();
        objects.push(machine_config());
        let plan = creation_plan(objects).unwrap();

        // installed with the security policy, ahead of config and workloads
        assert_eq!(
            names(&plan),
            vec![
                "ns",
                "cr",
                "crb",
                "sa",
                "scc",
                "51-rte-selinux",
                "cfg",
                "controller",
                "primary"
            ]
        );
        let (pool, condition) = &plan[5].follow_up[0];
        assert_eq!(pool.kind, "MachineConfigPool");
        assert_eq!(pool.name, "worker");
        assert_eq!(
            condition,
            &WaitFor::MachineConfigPoolCondition {
                condition: "Updated".to_string(),
                machine_config: Some("51-rte-selinux".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_machine_config_rollout() {
        let client = MockClusterClient::new().with_auto_ready();
        let plan = creation_plan(vec![machine_config()]).unwrap();
        apply_create(&client, &plan, fast()).await.unwrap();

        // a pool that never picks the config up times out
        let stale = MockClusterClient::with_objects(vec![object(
            "machineconfiguration.openshift.io/v1",
            "MachineConfigPool",
            None,
            "worker",
            &[],
        )]);
        let err = apply_create(&stale, &plan, fast()).await.unwrap_err();
        assert!(matches!(err, KubeError::WaitTimeout { .. }), "{}", err);
    }

    #[test]
    fn test_deletion_keeps_objects_of_foreign_namespace() {
        let objects = vec![
            object("v1", "Namespace", None, "ns", &[]),
            object("v1", "ConfigMap", Some("elsewhere"), "cfg", &[]),
        ];
        let plan = deletion_plan(objects).unwrap();
        assert_eq!(names(&plan), vec!["cfg", "ns"]);
    }

    #[test]
    fn test_crd_waits() {
        let crd = object("apiextensions.k8s.io/v1", "CustomResourceDefinition", None, "crd", &[]);
        let create = creation_plan(vec![crd.clone()]).unwrap();
        assert_eq!(create[0].wait, Some(WaitFor::CrdEstablished));
        let delete = deletion_plan(vec![crd]).unwrap();
        assert_eq!(delete[0].wait, Some(WaitFor::Gone));
    }

    #[tokio::test]
    async fn test_apply_create_in_order_with_waits() {
        let client = MockClusterClient::new().with_auto_ready();
        let plan = creation_plan(set()).unwrap();

        let summary = apply_create(&client, &plan, fast()).await.unwrap();
        assert_eq!(summary.succeeded.len(), 8);

        let created: Vec<String> = client.created().into_iter().map(|k| k.name).collect();
        assert_eq!(
            created,
            vec!["ns", "cr", "crb", "sa", "scc", "cfg", "controller", "primary"]
        );
    }

    #[tokio::test]
    async fn test_apply_create_waits_for_pods() {
        let mut pending = object("v1", "Pod", Some("ns"), "primary-abc", &[]);
        pending.data = serde_json::json!({"status": {"phase": "Pending"}});
        let client = MockClusterClient::with_objects(vec![pending]);

        let mut plan = creation_plan(vec![object(
            "apps/v1",
            "Deployment",
            Some("ns"),
            "primary",
            &[],
        )])
        .unwrap();
        // rolled out already, only the pods are left to check
        plan[0].wait = None;

        let err = wait_for_object(&client, &plan[0], fast().unwrap())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Deployment ns/primary"), "{}", err);
        assert!(client.operation_counts().lists > 0);

        client.set_status(
            &ObjectKey::namespaced("v1", "Pod", "ns", "primary-abc"),
            serde_json::json!({"phase": "Running"}),
        );
        wait_for_object(&client, &plan[0], fast().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_removal_waits_for_pods_to_go() {
        let mut lingering = object("v1", "Pod", Some("ns"), "primary-abc", &[]);
        lingering.data = serde_json::json!({"status": {"phase": "Running"}});
        let deployment = object("apps/v1", "Deployment", Some("ns"), "primary", &[]);
        let client = MockClusterClient::with_objects(vec![deployment.clone(), lingering]);
        let plan = deletion_plan(vec![deployment]).unwrap();

        let err = apply_delete(&client, &plan, fast()).await.unwrap_err();
        let failures = err.removal_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].object, "Deployment ns/primary");
        assert!(failures[0].message.contains("timed out"), "{}", failures[0].message);
    }

    #[tokio::test]
    async fn test_apply_create_is_fail_fast() {
        let client = MockClusterClient::new();
        client.fail_on(MockOperation::Create, "ConfigMap", "cfg", "quota exceeded");
        let plan = creation_plan(set()).unwrap();

        let err = apply_create(&client, &plan, None).await.unwrap_err();
        assert!(matches!(err, KubeError::Create { .. }));
        assert!(err.to_string().contains("ConfigMap ns/cfg"));
        assert_eq!(client.operation_counts().creates, 6);
    }

    #[tokio::test]
    async fn test_apply_create_without_wait_does_not_poll() {
        let client = MockClusterClient::new();
        let plan = creation_plan(set()).unwrap();
        apply_create(&client, &plan, None).await.unwrap();
        assert_eq!(client.operation_counts().gets, 0);
    }

    #[tokio::test]
    async fn test_removal_continues_past_failures() {
        let objects: Vec<DynamicObject> = (1..=5)
            .map(|i| {
                object(
                    "rbac.authorization.k8s.io/v1",
                    "ClusterRole",
                    None,
                    &format!("role-{}", i),
                    &[],
                )
            })
            .collect();
        let client = MockClusterClient::with_objects(objects.clone());
        client.fail_on(MockOperation::Delete, "ClusterRole", "role-2", "forbidden");
        let plan = deletion_plan(objects).unwrap();

        let err = apply_delete(&client, &plan, None).await.unwrap_err();

        assert_eq!(client.operation_counts().deletes, 5);
        assert_eq!(client.object_count(), 1);
        let failures = err.removal_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].object, "ClusterRole role-2");
        assert!(failures[0].message.contains("forbidden"));
    }

    #[tokio::test]
    async fn test_removal_not_found_is_success() {
        let client = MockClusterClient::new();
        let plan = deletion_plan(set()).unwrap();
        let summary = apply_delete(&client, &plan, fast()).await.unwrap();
        assert_eq!(summary.skipped.len(), plan.len());
        assert!(summary.succeeded.is_empty());
    }

    #[tokio::test]
    async fn test_removal_waits_for_absence() {
        let client = MockClusterClient::with_objects(set());
        let plan = deletion_plan(set()).unwrap();

        let summary = apply_delete(&client, &plan, fast()).await.unwrap();
        assert_eq!(summary.succeeded.len(), 6);
        assert_eq!(client.object_count(), 0);

        let deleted: Vec<String> = client.deleted().into_iter().map(|k| k.name).collect();
        assert_eq!(deleted.first().map(String::as_str), Some("primary"));
        assert_eq!(deleted.last().map(String::as_str), Some("ns"));
    }

    #[test]
    fn test_operation_summary() {
        let summary = OperationSummary {
            succeeded: vec!["a".to_string(), "b".to_string()],
            skipped: vec![("c".to_string(), "not found".to_string())],
        };
        insta::assert_snapshot!(summary.summary(), @"2 succeeded, 1 skipped");
        assert_eq!(OperationSummary::default().summary(), "No resources processed");
    }
}
