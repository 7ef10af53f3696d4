//! Mock cluster client for testing
//!
//! This client keeps objects in memory, useful for unit tests of the
//! detector, waiter, lifecycle manager and orchestrator without requiring a
//! Kubernetes cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ApiResource, DynamicObject};
use kube::core::ErrorResponse;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::client::{ClusterClient, ListSelector, ObjectKey};
use crate::error::{KubeError, Result};

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub deletes: usize,
    pub server_versions: usize,
}

/// Operation a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Create,
    Delete,
    Get,
}

/// Kubernetes-style API error
pub fn api_error(code: u16, reason: &str, message: impl Into<String>) -> KubeError {
    KubeError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}

fn not_found(key: &ObjectKey) -> KubeError {
    api_error(404, "NotFound", format!("{} not found", key))
}

/// In-memory cluster client for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    store: Arc<RwLock<BTreeMap<ObjectKey, DynamicObject>>>,
    operations: Arc<RwLock<OperationCounts>>,
    failures: Arc<RwLock<HashMap<(MockOperation, String, String), String>>>,
    created: Arc<RwLock<Vec<ObjectKey>>>,
    deleted: Arc<RwLock<Vec<ObjectKey>>>,
    kubelet_configs: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    server_version: Arc<RwLock<Option<String>>>,
    auto_ready: bool,
}

impl MockClusterClient {
    /// Create a new empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated objects
    pub fn with_objects(objects: Vec<DynamicObject>) -> Self {
        let client = Self::new();
        for obj in objects {
            client.insert(obj);
        }
        client
    }

    /// Play the cluster controllers: created workloads and CRDs report a
    /// ready status, workloads get a running pod that goes away with them, and
    /// MachineConfigs are rolled out to their pool at once
    pub fn with_auto_ready(mut self) -> Self {
        self.auto_ready = true;
        self
    }

    pub fn with_server_version(self, version: &str) -> Self {
        *self.server_version.write().unwrap() = Some(version.to_string());
        self
    }

    pub fn with_kubelet_config(self, node: &str, config: serde_json::Value) -> Self {
        self.kubelet_configs
            .write()
            .unwrap()
            .insert(node.to_string(), config);
        self
    }

    /// Make `op` on the object `kind`/`name` fail with a server error
    pub fn fail_on(&self, op: MockOperation, kind: &str, name: &str, message: &str) {
        self.failures.write().unwrap().insert(
            (op, kind.to_string(), name.to_string()),
            message.to_string(),
        );
    }

    /// Store an object without counting an operation
    pub fn insert(&self, obj: DynamicObject) {
        if let Ok(key) = ObjectKey::from_object(&obj) {
            self.store.write().unwrap().insert(key, obj);
        }
    }

    /// Replace the `status` of a stored object
    pub fn set_status(&self, key: &ObjectKey, status: serde_json::Value) {
        if let Some(obj) = self.store.write().unwrap().get_mut(key) {
            obj.data["status"] = status;
        }
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.store.read().unwrap().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.store.read().unwrap().len()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap() = OperationCounts::default();
    }

    /// Keys of successful creates, in call order
    pub fn created(&self) -> Vec<ObjectKey> {
        self.created.read().unwrap().clone()
    }

    /// Keys of delete calls, in call order, including failed ones
    pub fn deleted(&self) -> Vec<ObjectKey> {
        self.deleted.read().unwrap().clone()
    }

    fn injected(&self, op: MockOperation, key: &ObjectKey) -> Option<KubeError> {
        self.failures
            .read()
            .unwrap()
            .get(&(op, key.kind.clone(), key.name.clone()))
            .map(|message| api_error(500, "InternalError", message.clone()))
    }

    fn make_ready(obj: &mut DynamicObject) {
        let kind = obj.types.as_ref().map(|t| t.kind.clone()).unwrap_or_default();
        obj.metadata.generation = Some(1);
        match kind.as_str() {
            "Deployment" => {
                let replicas = obj.data["spec"]["replicas"].as_i64().unwrap_or(1);
                obj.data["status"] = json!({
                    "observedGeneration": 1,
                    "replicas": replicas,
                    "readyReplicas": replicas,
                    "updatedReplicas": replicas,
                    "availableReplicas": replicas,
                });
            }
            "DaemonSet" => {
                obj.data["status"] = json!({
                    "desiredNumberScheduled": 1,
                    "currentNumberScheduled": 1,
                    "numberReady": 1,
                    "updatedNumberScheduled": 1,
                    "numberMisscheduled": 0,
                });
            }
            "CustomResourceDefinition" => {
                obj.data["status"] = json!({
                    "conditions": [{"type": "Established", "status": "True"}],
                });
            }
            _ => {}
        }
    }

    fn workload_pods(key: &ObjectKey) -> Option<(String, String)> {
        match (key.kind.as_str(), &key.namespace) {
            ("Deployment" | "DaemonSet", Some(ns)) => {
                Some((ns.clone(), format!("{}-", key.name)))
            }
            _ => None,
        }
    }

    /// Side effects of a controller noticing a new object
    fn reconcile(
        store: &mut BTreeMap<ObjectKey, DynamicObject>,
        key: &ObjectKey,
        obj: &DynamicObject,
    ) {
        if let Some((namespace, prefix)) = Self::workload_pods(key) {
            let name = format!("{}0", prefix);
            let pod_key = ObjectKey::namespaced("v1", "Pod", &namespace, &name);
            let pod = DynamicObject::new(&name, &ApiResource::erase::<Pod>(&()))
                .within(&namespace)
                .data(json!({"status": {"phase": "Running"}}));
            store.insert(pod_key, pod);
        }

        let role = obj
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get("machineconfiguration.openshift.io/role"));
        if key.kind == "MachineConfig"
            && let Some(role) = role
        {
            let pool_key = ObjectKey::cluster(
                "machineconfiguration.openshift.io/v1",
                "MachineConfigPool",
                role,
            );
            let pool = store.entry(pool_key).or_insert_with(|| {
                let mut pool = DynamicObject::new(role, &machine_config_pool());
                pool.data = json!({"status": {"configuration": {"source": []}}});
                pool
            });
            pool.data["status"]["conditions"] = json!([{"type": "Updated", "status": "True"}]);
            if let Some(sources) = pool.data["status"]["configuration"]["source"].as_array_mut() {
                sources.push(json!({"kind": "MachineConfig", "name": key.name}));
            }
        }
    }
}

fn machine_config_pool() -> ApiResource {
    ApiResource {
        group: "machineconfiguration.openshift.io".to_string(),
        version: "v1".to_string(),
        api_version: "machineconfiguration.openshift.io/v1".to_string(),
        kind: "MachineConfigPool".to_string(),
        plural: "machineconfigpools".to_string(),
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.creates += 1;
        }

        let key = ObjectKey::from_object(obj)?;
        if let Some(err) = self.injected(MockOperation::Create, &key) {
            return Err(err);
        }

        let mut store = self.store.write().unwrap();
        if store.contains_key(&key) {
            return Err(api_error(409, "AlreadyExists", format!("{} already exists", key)));
        }
        let mut stored = obj.clone();
        if stored.data.is_null() {
            stored.data = json!({});
        }
        if self.auto_ready {
            Self::make_ready(&mut stored);
            Self::reconcile(&mut store, &key, &stored);
        }
        store.insert(key.clone(), stored.clone());
        self.created.write().unwrap().push(key);
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.deletes += 1;
        }
        self.deleted.write().unwrap().push(key.clone());

        if let Some(err) = self.injected(MockOperation::Delete, key) {
            return Err(err);
        }

        let mut store = self.store.write().unwrap();
        if store.remove(key).is_none() {
            return Err(not_found(key));
        }
        // Namespace deletion takes its content with it
        if key.kind == "Namespace" {
            store.retain(|k, _| k.namespace.as_deref() != Some(key.name.as_str()));
        }
        if self.auto_ready
            && let Some((namespace, prefix)) = Self::workload_pods(key)
        {
            store.retain(|k, _| {
                k.kind != "Pod"
                    || k.namespace.as_deref() != Some(namespace.as_str())
                    || !k.name.starts_with(&prefix)
            });
        }
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.gets += 1;
        }
        if let Some(err) = self.injected(MockOperation::Get, key) {
            return Err(err);
        }

        let store = self.store.read().unwrap();
        store.get(key).cloned().ok_or_else(|| not_found(key))
    }

    async fn list(&self, selector: &ListSelector) -> Result<Vec<DynamicObject>> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.lists += 1;
        }

        // Only `key` and `key=value` terms are understood
        let terms: Vec<(&str, Option<&str>)> = selector
            .label_selector
            .as_deref()
            .map(|s| {
                s.split(',')
                    .map(|t| match t.split_once('=') {
                        Some((k, v)) => (k.trim(), Some(v.trim())),
                        None => (t.trim(), None),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let store = self.store.read().unwrap();
        Ok(store
            .iter()
            .filter(|(k, _)| k.api_version == selector.api_version && k.kind == selector.kind)
            .filter(|(k, _)| {
                selector
                    .namespace
                    .as_ref()
                    .is_none_or(|ns| k.namespace.as_ref() == Some(ns))
            })
            .filter(|(_, obj)| {
                let labels = obj.metadata.labels.clone().unwrap_or_default();
                terms.iter().all(|(k, v)| match v {
                    Some(v) => labels.get(*k).map(String::as_str) == Some(*v),
                    None => labels.contains_key(*k),
                })
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn server_version(&self) -> Result<String> {
        {
            let mut ops = self.operations.write().unwrap();
            ops.server_versions += 1;
        }
        self.server_version
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| api_error(503, "ServiceUnavailable", "version endpoint unavailable"))
    }

    async fn kubelet_config(&self, node: &str) -> Result<serde_json::Value> {
        self.kubelet_configs
            .read()
            .unwrap()
            .get(node)
            .cloned()
            .ok_or_else(|| api_error(404, "NotFound", format!("node {} not found", node)))
    }
}
