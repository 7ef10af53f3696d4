//! The cluster client seam
//!
//! Every cluster access in this crate goes through [`ClusterClient`], so the
//! detector, waiter and lifecycle manager run unchanged against a live API
//! server ([`KubeClusterClient`]) or the in-memory [`MockClusterClient`].
//!
//! [`MockClusterClient`]: crate::mock::MockClusterClient

use async_trait::async_trait;
use http::Request;
use kube::{
    Client,
    api::{Api, DeleteParams, DynamicObject, ListParams, PostParams},
    core::GroupVersionKind,
    discovery::{ApiResource, Discovery, Scope},
};
use std::fmt;
use tracing::debug;

use crate::error::{KubeError, Result};

/// Identity of an object in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn cluster(api_version: &str, kind: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: None,
            name: name.to_string(),
        }
    }

    pub fn namespaced(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    /// Key of a rendered object, which must carry apiVersion, kind and name
    pub fn from_object(obj: &DynamicObject) -> Result<Self> {
        let types = obj.types.as_ref().ok_or_else(|| {
            KubeError::InvalidObject("resource missing apiVersion or kind".to_string())
        })?;
        let name = obj.metadata.name.clone().ok_or_else(|| {
            KubeError::InvalidObject(format!("{} missing metadata.name", types.kind))
        })?;
        Ok(Self {
            api_version: types.api_version.clone(),
            kind: types.kind.clone(),
            namespace: obj.metadata.namespace.clone(),
            name,
        })
    }

    /// `namespace/name`, or `name` for cluster-scoped objects
    pub fn namespaced_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.namespaced_name())
    }
}

/// Which objects a `list` call returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSelector {
    pub api_version: String,
    pub kind: String,
    /// `None` lists across all namespaces
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl ListSelector {
    pub fn new(api_version: &str, kind: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: None,
            label_selector: None,
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    pub fn with_labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }
}

/// Operations the deployer needs from a cluster
///
/// `get` and `delete` report a missing object as an error for which
/// [`KubeError::is_not_found`] holds.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create an object, returning the stored version
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Delete an object with background propagation
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Fetch the current state of an object
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject>;

    /// List objects of one kind
    async fn list(&self, selector: &ListSelector) -> Result<Vec<DynamicObject>>;

    /// API server `gitVersion`
    async fn server_version(&self) -> Result<String>;

    /// Running kubelet configuration of a node, read through the node proxy
    async fn kubelet_config(&self, node: &str) -> Result<serde_json::Value>;
}

/// Split an apiVersion into group and version
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_parts(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    GroupVersionKind {
        group,
        version,
        kind: kind.to_string(),
    }
}

/// [`ClusterClient`] backed by kube-rs
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    discovery: std::sync::Arc<Discovery>,
}

impl KubeClusterClient {
    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Self::from_client(client).await
    }

    /// Wrap an existing client, running API discovery once
    pub async fn from_client(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: std::sync::Arc::new(discovery),
        })
    }

    fn resolve(&self, api_version: &str, kind: &str) -> Result<(ApiResource, Scope)> {
        let gvk = gvk_from_parts(api_version, kind);
        self.discovery
            .resolve_gvk(&gvk)
            .map(|(ar, caps)| (ar, caps.scope))
            .ok_or_else(|| KubeError::UnknownResource {
                api_version: api_version.to_string(),
                kind: kind.to_string(),
            })
    }

    fn api(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>> {
        let (ar, scope) = self.resolve(api_version, kind)?;
        Ok(match (scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        })
    }

    fn api_for_key(&self, key: &ObjectKey) -> Result<Api<DynamicObject>> {
        let (ar, scope) = self.resolve(&key.api_version, &key.kind)?;
        Ok(match scope {
            Scope::Namespaced => Api::namespaced_with(
                self.client.clone(),
                key.namespace.as_deref().unwrap_or("default"),
                &ar,
            ),
            Scope::Cluster => Api::all_with(self.client.clone(), &ar),
        })
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let key = ObjectKey::from_object(obj)?;
        let api = self.api_for_key(&key)?;
        debug!(kind = %key.kind, key = %key.namespaced_name(), "POST");
        Ok(api.create(&PostParams::default(), obj).await?)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let api = self.api_for_key(key)?;
        debug!(kind = %key.kind, key = %key.namespaced_name(), "DELETE");
        api.delete(&key.name, &DeleteParams::background()).await?;
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject> {
        let api = self.api_for_key(key)?;
        Ok(api.get(&key.name).await?)
    }

    async fn list(&self, selector: &ListSelector) -> Result<Vec<DynamicObject>> {
        let api = self.api(
            &selector.api_version,
            &selector.kind,
            selector.namespace.as_deref(),
        )?;
        let mut params = ListParams::default();
        if let Some(labels) = &selector.label_selector {
            params = params.labels(labels);
        }
        Ok(api.list(&params).await?.items)
    }

    async fn server_version(&self) -> Result<String> {
        Ok(self.client.apiserver_version().await?.git_version)
    }

    async fn kubelet_config(&self, node: &str) -> Result<serde_json::Value> {
        let request = Request::get(format!("/api/v1/nodes/{}/proxy/configz", node))
            .body(Vec::new())?;
        let mut response: serde_json::Value = self.client.request(request).await?;
        // configz wraps the configuration in a single "kubeletconfig" field
        Ok(match response.get_mut("kubeletconfig") {
            Some(inner) => inner.take(),
            None => response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use kube::core::TypeMeta;

    #[test]
    fn test_gvk_from_parts() {
        let gvk = gvk_from_parts("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");

        let gvk = gvk_from_parts("v1", "ConfigMap");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");

        let gvk = gvk_from_parts("security.openshift.io/v1", "SecurityContextConstraints");
        assert_eq!(gvk.group, "security.openshift.io");
    }

    #[test]
    fn test_object_key_from_object() {
        let obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "apps/v1".to_string(),
                kind: "DaemonSet".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("rte".to_string()),
                namespace: Some("tas".to_string()),
                ..Default::default()
            },
            data: serde_json::Value::Null,
        };
        let key = ObjectKey::from_object(&obj).unwrap();
        assert_eq!(key, ObjectKey::namespaced("apps/v1", "DaemonSet", "tas", "rte"));
        insta::assert_snapshot!(key.to_string(), @"DaemonSet tas/rte");
    }

    #[test]
    fn test_object_key_requires_types_and_name() {
        let mut obj = DynamicObject {
            types: None,
            metadata: ObjectMeta::default(),
            data: serde_json::Value::Null,
        };
        assert!(ObjectKey::from_object(&obj).is_err());

        obj.types = Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: "Namespace".to_string(),
        });
        assert!(ObjectKey::from_object(&obj).is_err());
    }

    #[test]
    fn test_cluster_key_display() {
        let key = ObjectKey::cluster("v1", "Namespace", "tas-scheduler");
        assert_eq!(key.to_string(), "Namespace tas-scheduler");
        assert_eq!(key.namespaced_name(), "tas-scheduler");
    }

    #[test]
    fn test_list_selector_builder() {
        let sel = ListSelector::new("v1", "Pod")
            .in_namespace("ns")
            .with_labels("app=rte");
        assert_eq!(sel.namespace.as_deref(), Some("ns"));
        assert_eq!(sel.label_selector.as_deref(), Some("app=rte"));
    }
}
