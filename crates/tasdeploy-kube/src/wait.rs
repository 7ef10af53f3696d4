//! Bounded polling for readiness and absence
//!
//! Each poll performs exactly one read (a `get` for object predicates, a
//! `list` for pod predicates). A missing object satisfies the absence
//! predicates and keeps every other predicate polling. Any other read error
//! aborts the wait.

use kube::api::DynamicObject;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::client::{ClusterClient, ListSelector, ObjectKey};
use crate::error::{KubeError, Result};

/// Poll interval used when none is given
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Wait bound used when none is given
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(180);

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl WaitOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Condition a wait blocks on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFor {
    /// Every desired replica is ready and updated, and the controller has
    /// observed the latest generation
    DeploymentComplete,
    /// Every scheduled pod is ready and updated
    DaemonSetReady,
    /// The CRD reports `Established=True`
    CrdEstablished,
    /// The object no longer exists
    Gone,
    /// At least one pod with the name prefix exists and all of them run
    PodsRunning { namespace: String, prefix: String },
    /// No pod with the name prefix is left
    PodsGone { namespace: String, prefix: String },
    /// A MachineConfigPool condition is `True`, and when `machine_config` is
    /// set, the pool's rendered configuration includes it
    MachineConfigPoolCondition {
        condition: String,
        machine_config: Option<String>,
    },
}

fn int(v: &Value) -> i64 {
    v.as_i64().unwrap_or(0)
}

fn condition_true(obj: &DynamicObject, condition: &str) -> bool {
    obj.data["status"]["conditions"]
        .as_array()
        .is_some_and(|conds| {
            conds.iter().any(|c| {
                c["type"].as_str() == Some(condition) && c["status"].as_str() == Some("True")
            })
        })
}

fn pool_includes(obj: &DynamicObject, machine_config: &str) -> bool {
    obj.data["status"]["configuration"]["source"]
        .as_array()
        .is_some_and(|sources| sources.iter().any(|s| s["name"].as_str() == Some(machine_config)))
}

fn deployment_complete(obj: &DynamicObject) -> bool {
    let desired = obj.data["spec"]["replicas"].as_i64().unwrap_or(1);
    let status = &obj.data["status"];
    let ready = int(&status["readyReplicas"]);
    let updated = int(&status["updatedReplicas"]);
    let observed = int(&status["observedGeneration"]);
    let generation = obj.metadata.generation.unwrap_or(0);

    desired > 0 && ready == desired && updated == desired && observed >= generation
}

fn daemonset_ready(obj: &DynamicObject) -> bool {
    let status = &obj.data["status"];
    let desired = int(&status["desiredNumberScheduled"]);
    let ready = int(&status["numberReady"]);
    let updated = int(&status["updatedNumberScheduled"]);

    desired > 0 && ready == desired && updated == desired
}

fn pod_matches(pod: &DynamicObject, prefix: &str) -> bool {
    pod.metadata
        .name
        .as_deref()
        .is_some_and(|n| n.starts_with(prefix))
}

impl WaitFor {
    /// Whether the predicate is satisfied by the object disappearing
    pub fn is_absence(&self) -> bool {
        matches!(self, WaitFor::Gone | WaitFor::PodsGone { .. })
    }

    /// Evaluate an object predicate against a fresh read; `None` means not found
    pub fn check(&self, observed: Option<&DynamicObject>) -> bool {
        let Some(obj) = observed else {
            return self.is_absence();
        };
        match self {
            WaitFor::DeploymentComplete => deployment_complete(obj),
            WaitFor::DaemonSetReady => daemonset_ready(obj),
            WaitFor::CrdEstablished => condition_true(obj, "Established"),
            WaitFor::MachineConfigPoolCondition {
                condition,
                machine_config,
            } => {
                condition_true(obj, condition)
                    && machine_config.as_deref().is_none_or(|mc| pool_includes(obj, mc))
            }
            WaitFor::Gone => false,
            WaitFor::PodsRunning { .. } | WaitFor::PodsGone { .. } => false,
        }
    }

    /// Evaluate a pod predicate against the pods of its namespace
    pub fn check_pods(&self, pods: &[DynamicObject]) -> bool {
        match self {
            WaitFor::PodsRunning { prefix, .. } => {
                let matching: Vec<&DynamicObject> =
                    pods.iter().filter(|p| pod_matches(p, prefix)).collect();
                !matching.is_empty()
                    && matching
                        .iter()
                        .all(|p| p.data["status"]["phase"].as_str() == Some("Running"))
            }
            WaitFor::PodsGone { prefix, .. } => !pods.iter().any(|p| pod_matches(p, prefix)),
            _ => false,
        }
    }

    fn pod_namespace(&self) -> Option<&str> {
        match self {
            WaitFor::PodsRunning { namespace, .. } | WaitFor::PodsGone { namespace, .. } => {
                Some(namespace.as_str())
            }
            _ => None,
        }
    }
}

/// One poll: read the object (or its pods) and evaluate the predicate
async fn poll_once(
    client: &dyn ClusterClient,
    key: &ObjectKey,
    condition: &WaitFor,
) -> Result<(bool, Option<DynamicObject>)> {
    if let Some(namespace) = condition.pod_namespace() {
        let pods = client
            .list(&ListSelector::new("v1", "Pod").in_namespace(namespace))
            .await?;
        return Ok((condition.check_pods(&pods), None));
    }

    let observed = match client.get(key).await {
        Ok(obj) => Some(obj),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    Ok((condition.check(observed.as_ref()), observed))
}

/// Poll `key` until `condition` holds or `options.timeout` elapses
///
/// Returns the last observed object, `None` when the wait ended on absence
/// or on a pod predicate.
pub async fn wait_for(
    client: &dyn ClusterClient,
    key: &ObjectKey,
    condition: &WaitFor,
    options: WaitOptions,
) -> Result<Option<DynamicObject>> {
    let start = Instant::now();
    debug!(kind = %key.kind, key = %key.namespaced_name(), ?condition, "waiting");

    loop {
        let (done, observed) =
            poll_once(client, key, condition)
                .await
                .map_err(|e| KubeError::Wait {
                    object: key.to_string(),
                    source: Box::new(e),
                })?;

        if done {
            info!(
                kind = %key.kind,
                key = %key.namespaced_name(),
                elapsed = ?start.elapsed(),
                "wait complete"
            );
            return Ok(observed);
        }

        if start.elapsed() >= options.timeout {
            return Err(KubeError::WaitTimeout {
                kind: key.kind.clone(),
                key: key.namespaced_name(),
                timeout: options.timeout,
            });
        }

        sleep(options.interval).await;
    }
}
