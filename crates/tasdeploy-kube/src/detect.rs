//! Platform and version detection
//!
//! A user override always wins and never touches the cluster. Otherwise the
//! cluster is queried through a few well known objects:
//!
//! - `ClusterVersion/version` exists: OpenShift, or HyperShift when the
//!   `Infrastructure/cluster` control plane topology is `External`
//! - `kube-public/microshift-version` ConfigMap exists: MicroShift
//! - neither: plain Kubernetes

use tasdeploy_core::{Detection, Platform, PlatformOverride, PlatformVersion};
use tracing::{debug, info};

use crate::client::{ClusterClient, ListSelector, ObjectKey};
use crate::error::{KubeError, Result};

const OPENSHIFT_CONFIG_API: &str = "config.openshift.io/v1";

/// Node labels marking control-plane nodes across distributions
pub const CONTROL_PLANE_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

fn cluster_version_key() -> ObjectKey {
    ObjectKey::cluster(OPENSHIFT_CONFIG_API, "ClusterVersion", "version")
}

fn infrastructure_key() -> ObjectKey {
    ObjectKey::cluster(OPENSHIFT_CONFIG_API, "Infrastructure", "cluster")
}

fn microshift_version_key() -> ObjectKey {
    ObjectKey::namespaced("v1", "ConfigMap", "kube-public", "microshift-version")
}

/// Platform and version resolved for one run
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClusterTarget {
    pub platform: Detection<Platform>,
    pub version: Detection<PlatformVersion>,
}

impl ClusterTarget {
    /// A target taken verbatim from the user
    pub fn user_supplied(platform: Platform, version: PlatformVersion) -> Self {
        Self {
            platform: Detection::user_supplied(platform),
            version: Detection::user_supplied(version),
        }
    }
}

/// Whether `key` exists; any error other than not-found is surfaced
async fn exists(client: &dyn ClusterClient, key: &ObjectKey) -> Result<bool> {
    match client.get(key).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Determine the platform kind
pub async fn find_platform(
    client: &dyn ClusterClient,
    user: Option<Platform>,
) -> Result<Detection<Platform>> {
    if let Some(platform) = user.filter(Platform::is_known) {
        debug!(%platform, "platform supplied by user");
        return Ok(Detection::user_supplied(platform));
    }

    let detection = if exists(client, &cluster_version_key()).await? {
        let hosted = match client.get(&infrastructure_key()).await {
            Ok(infra) => {
                infra.data["status"]["controlPlaneTopology"].as_str() == Some("External")
            }
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };
        if hosted {
            Detection::from_cluster(
                Platform::HyperShift,
                "ClusterVersion found, control plane topology is External",
            )
        } else {
            Detection::from_cluster(Platform::OpenShift, "ClusterVersion found")
        }
    } else if exists(client, &microshift_version_key()).await? {
        Detection::from_cluster(
            Platform::MicroShift,
            "kube-public/microshift-version ConfigMap found",
        )
    } else {
        Detection::from_cluster(Platform::Kubernetes, "no distribution marker found")
    };

    info!(platform = %detection.discovered, reason = %detection.reason, "platform detected");
    Ok(detection)
}

/// Determine the platform version
pub async fn find_version(
    client: &dyn ClusterClient,
    platform: Platform,
    user: Option<PlatformVersion>,
) -> Result<Detection<PlatformVersion>> {
    if let Some(version) = user {
        debug!(%version, "version supplied by user");
        return Ok(Detection::user_supplied(version));
    }

    let (raw, reason) = match platform {
        Platform::OpenShift | Platform::HyperShift => {
            let cv = client.get(&cluster_version_key()).await?;
            let status = &cv.data["status"];
            let raw = status["desired"]["version"]
                .as_str()
                .filter(|v| !v.is_empty())
                .or_else(|| status["history"][0]["version"].as_str())
                .ok_or_else(|| {
                    KubeError::Detection("ClusterVersion reports no version".to_string())
                })?;
            (raw.to_string(), "ClusterVersion status")
        }
        Platform::MicroShift => {
            let cm = client.get(&microshift_version_key()).await?;
            let raw = cm.data["data"]["version"].as_str().ok_or_else(|| {
                KubeError::Detection("microshift-version ConfigMap has no version key".to_string())
            })?;
            (raw.to_string(), "microshift-version ConfigMap")
        }
        Platform::Kubernetes => (client.server_version().await?, "API server gitVersion"),
        Platform::Unknown => {
            return Err(KubeError::Detection(
                "cannot determine the version of an unknown platform".to_string(),
            ));
        }
    };

    let version: PlatformVersion = raw.parse()?;
    info!(%version, source = reason, "version detected");
    Ok(Detection::from_cluster(version, format!("{} reports {}", reason, raw)))
}

/// Resolve platform then version, honoring any part of a user override
pub async fn detect(client: &dyn ClusterClient, user: &PlatformOverride) -> Result<ClusterTarget> {
    let platform = find_platform(client, user.platform).await?;
    let version = find_version(client, platform.discovered, user.version.clone()).await?;
    Ok(ClusterTarget { platform, version })
}

/// Version assumed for `platform` when no cluster is consulted
pub fn default_version(platform: Platform) -> PlatformVersion {
    match platform {
        Platform::OpenShift | Platform::HyperShift | Platform::MicroShift => {
            PlatformVersion::new(4, 14)
        }
        Platform::Kubernetes | Platform::Unknown => PlatformVersion::new(1, 29),
    }
}

/// Target for commands that never reach a cluster
///
/// Whatever the override leaves out falls back to Kubernetes and the
/// default version of the platform.
pub fn offline_target(user: &PlatformOverride) -> ClusterTarget {
    let platform = match user.platform.filter(Platform::is_known) {
        Some(platform) => Detection::user_supplied(platform),
        None => Detection::fallback(Platform::Kubernetes, "no platform given, rendering offline"),
    };
    let version = match &user.version {
        Some(version) => Detection::user_supplied(version.clone()),
        None => Detection::fallback(
            default_version(platform.discovered),
            format!("default version for {}", platform.discovered),
        ),
    };
    ClusterTarget { platform, version }
}

/// Number of nodes carrying a control-plane role label
pub async fn count_control_plane_nodes(client: &dyn ClusterClient) -> Result<usize> {
    let nodes = client.list(&ListSelector::new("v1", "Node")).await?;
    let count = nodes
        .iter()
        .filter(|n| {
            n.metadata
                .labels
                .as_ref()
                .is_some_and(|l| CONTROL_PLANE_LABELS.iter().any(|k| l.contains_key(*k)))
        })
        .count();
    debug!(count, "control-plane nodes");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::fixtures::object;
    use crate::mock::{MockClusterClient, MockOperation, OperationCounts};
    use serde_json::json;
    use tasdeploy_core::DetectionSource;

    fn cluster_version(version: &str) -> kube::api::DynamicObject {
        let mut cv = object(OPENSHIFT_CONFIG_API, "ClusterVersion", None, "version", &[]);
        cv.data = json!({"status": {"desired": {"version": version}}});
        cv
    }

    #[tokio::test]
    async fn test_override_skips_cluster_calls() {
        let client = MockClusterClient::new().with_server_version("v1.30.1");
        let user: PlatformOverride = "generic:v1.28".parse().unwrap();

        let target = detect(&client, &user).await.unwrap();

        assert_eq!(target.platform.discovered, Platform::Kubernetes);
        assert_eq!(target.platform.source, DetectionSource::UserSupplied);
        assert_eq!(target.version.discovered, PlatformVersion::new(1, 28));
        assert_eq!(target.version.source, DetectionSource::UserSupplied);
        assert_eq!(client.operation_counts(), OperationCounts::default());
    }

    #[test]
    fn test_offline_target() {
        let target = offline_target(&PlatformOverride::default());
        assert_eq!(target.platform.discovered, Platform::Kubernetes);
        assert_eq!(target.platform.source, DetectionSource::Fallback);
        assert_eq!(target.version.discovered, PlatformVersion::new(1, 29));

        let target = offline_target(&"openshift".parse().unwrap());
        assert_eq!(target.platform.source, DetectionSource::UserSupplied);
        assert_eq!(target.version.discovered, PlatformVersion::new(4, 14));
        assert_eq!(target.version.source, DetectionSource::Fallback);
    }

    #[tokio::test]
    async fn test_detect_kubernetes() {
        let client = MockClusterClient::new().with_server_version("v1.29.2+k3s1");
        let target = detect(&client, &PlatformOverride::default()).await.unwrap();
        assert_eq!(target.platform.discovered, Platform::Kubernetes);
        assert_eq!(target.platform.source, DetectionSource::Cluster);
        assert_eq!(target.version.discovered.to_string(), "v1.29.2");
    }

    #[tokio::test]
    async fn test_detect_openshift() {
        let client = MockClusterClient::with_objects(vec![cluster_version("4.14.8")]);
        let target = detect(&client, &PlatformOverride::default()).await.unwrap();
        assert_eq!(target.platform.discovered, Platform::OpenShift);
        assert_eq!(target.version.discovered.to_string(), "v4.14.8");
    }

    #[tokio::test]
    async fn test_detect_hypershift() {
        let mut infra = object(OPENSHIFT_CONFIG_API, "Infrastructure", None, "cluster", &[]);
        infra.data = json!({"status": {"controlPlaneTopology": "External"}});
        let client = MockClusterClient::with_objects(vec![cluster_version("4.15.0"), infra]);

        let platform = find_platform(&client, None).await.unwrap();
        assert_eq!(platform.discovered, Platform::HyperShift);
    }

    #[tokio::test]
    async fn test_detect_microshift() {
        let mut cm = object("v1", "ConfigMap", Some("kube-public"), "microshift-version", &[]);
        cm.data = json!({"data": {"version": "4.15.2"}});
        let client = MockClusterClient::with_objects(vec![cm]);

        let target = detect(&client, &PlatformOverride::default()).await.unwrap();
        assert_eq!(target.platform.discovered, Platform::MicroShift);
        assert_eq!(target.version.discovered.to_string(), "v4.15.2");
    }

    #[tokio::test]
    async fn test_openshift_version_from_history() {
        let mut cv = object(OPENSHIFT_CONFIG_API, "ClusterVersion", None, "version", &[]);
        cv.data = json!({"status": {"history": [{"version": "4.13.4"}, {"version": "4.12.9"}]}});
        let client = MockClusterClient::with_objects(vec![cv]);

        let version = find_version(&client, Platform::OpenShift, None).await.unwrap();
        assert_eq!(version.discovered.to_string(), "v4.13.4");
    }

    #[tokio::test]
    async fn test_lookup_error_is_surfaced() {
        let client = MockClusterClient::new();
        client.fail_on(MockOperation::Get, "ClusterVersion", "version", "forbidden");
        let err = find_platform(&client, None).await.unwrap_err();
        assert!(err.to_string().contains("forbidden"));
    }

    #[tokio::test]
    async fn test_platform_override_only_reads_version() {
        let client = MockClusterClient::new().with_server_version("v1.27.3");
        let user: PlatformOverride = "kubernetes".parse().unwrap();
        let target = detect(&client, &user).await.unwrap();
        assert_eq!(target.platform.source, DetectionSource::UserSupplied);
        assert_eq!(target.version.source, DetectionSource::Cluster);
        assert_eq!(client.operation_counts().gets, 0);
        assert_eq!(client.operation_counts().server_versions, 1);
    }

    #[tokio::test]
    async fn test_unparsable_version_is_an_error() {
        let client = MockClusterClient::new().with_server_version("banana");
        assert!(find_version(&client, Platform::Kubernetes, None).await.is_err());
    }

    #[tokio::test]
    async fn test_count_control_plane_nodes() {
        let client = MockClusterClient::with_objects(vec![
            object("v1", "Node", None, "a", &[("node-role.kubernetes.io/control-plane", "")]),
            object("v1", "Node", None, "b", &[("node-role.kubernetes.io/master", "")]),
            object("v1", "Node", None, "c", &[("node-role.kubernetes.io/worker", "")]),
        ]);
        assert_eq!(count_control_plane_nodes(&client).await.unwrap(), 2);
    }
}
