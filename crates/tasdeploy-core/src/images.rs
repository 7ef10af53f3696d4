//! Component images and the mirror transform

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Registry hosting the mirrored images
pub const MIRROR_REGISTRY: &str = "quay.io";

/// Organization hosting the mirrored images
pub const MIRROR_ORG: &str = "k8stopologyawareschedwg";

const RTE_IMAGE: &str = "quay.io/k8stopologyawareschedwg/resource-topology-exporter:v0.16.3";
const NFD_IMAGE: &str = "registry.k8s.io/nfd/node-feature-discovery:v0.15.4";
const SCHED_IMAGE: &str = "registry.k8s.io/scheduler-plugins/kube-scheduler:v0.28.9";
const SCHED_CTRL_IMAGE: &str = "registry.k8s.io/scheduler-plugins/controller:v0.28.9";

static REVISION_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^r\d+-(.+)$").unwrap());

/// Pull specs of every component image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Images {
    pub resource_topology_exporter: String,
    pub topology_updater: String,
    pub scheduler_plugin: String,
    pub scheduler_controller: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            resource_topology_exporter: RTE_IMAGE.to_string(),
            topology_updater: NFD_IMAGE.to_string(),
            scheduler_plugin: SCHED_IMAGE.to_string(),
            scheduler_controller: SCHED_CTRL_IMAGE.to_string(),
        }
    }
}

impl Images {
    /// Images mirrored to the internal registry for `revision`
    pub fn mirrored(&self, revision: u32) -> Self {
        Self {
            resource_topology_exporter: mirror(&self.resource_topology_exporter, revision),
            topology_updater: mirror(&self.topology_updater, revision),
            scheduler_plugin: mirror(&self.scheduler_plugin, revision),
            scheduler_controller: mirror(&self.scheduler_controller, revision),
        }
    }

    /// `(role, pull spec)` pairs in a stable order
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("resource-topology-exporter", self.resource_topology_exporter.as_str()),
            ("topology-updater", self.topology_updater.as_str()),
            ("scheduler-plugin", self.scheduler_plugin.as_str()),
            ("scheduler-controller", self.scheduler_controller.as_str()),
        ]
    }
}

/// Map an upstream pull spec to its mirrored equivalent
///
/// `registry/org/name:tag` becomes `quay.io/k8stopologyawareschedwg/name:r<revision>-tag`.
/// Digest references and specs with fewer than three path components are
/// returned unchanged. Mirroring an already mirrored spec only replaces the
/// revision.
pub fn mirror(spec: &str, revision: u32) -> String {
    if spec.contains('@') {
        return spec.to_string();
    }

    let parts: Vec<&str> = spec.split('/').collect();
    if parts.len() < 3 || parts.iter().any(|p| p.is_empty()) {
        return spec.to_string();
    }

    let last = parts[parts.len() - 1];
    let (name, tag) = match last.split_once(':') {
        Some((name, tag)) if !tag.is_empty() => (name, tag),
        Some((name, _)) => (name, "latest"),
        None => (last, "latest"),
    };

    let already_mirrored =
        parts.len() == 3 && parts[0] == MIRROR_REGISTRY && parts[1] == MIRROR_ORG;
    let tag = if already_mirrored {
        REVISION_PREFIX
            .captures(tag)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(tag)
    } else {
        tag
    };

    format!("{}/{}/{}:r{}-{}", MIRROR_REGISTRY, MIRROR_ORG, name, revision, tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_basic() {
        insta::assert_snapshot!(
            mirror("registry.example/org/name:tag", 7),
            @"quay.io/k8stopologyawareschedwg/name:r7-tag"
        );
    }

    #[test]
    fn test_mirror_deep_path_uses_last_component() {
        assert_eq!(
            mirror("registry.k8s.io/scheduler-plugins/kube-scheduler:v0.28.9", 3),
            "quay.io/k8stopologyawareschedwg/kube-scheduler:r3-v0.28.9"
        );
        assert_eq!(
            mirror("localhost:5000/a/b/c:1.0", 1),
            "quay.io/k8stopologyawareschedwg/c:r1-1.0"
        );
    }

    #[test]
    fn test_mirror_passthrough() {
        let digest = "registry.example/org/name@sha256:0123456789abcdef";
        assert_eq!(mirror(digest, 1), digest);
        assert_eq!(mirror("org/name:tag", 1), "org/name:tag");
        assert_eq!(mirror("name:tag", 1), "name:tag");
        assert_eq!(mirror("registry//name:tag", 1), "registry//name:tag");
    }

    #[test]
    fn test_mirror_missing_tag_is_latest() {
        assert_eq!(
            mirror("registry.example/org/name", 2),
            "quay.io/k8stopologyawareschedwg/name:r2-latest"
        );
    }

    #[test]
    fn test_mirror_fixed_point() {
        let once = mirror("registry.example/org/name:tag", 4);
        assert_eq!(mirror(&once, 4), once);

        // Re-mirroring with another revision swaps only the revision
        assert_eq!(
            mirror(&once, 5),
            "quay.io/k8stopologyawareschedwg/name:r5-tag"
        );
    }

    #[test]
    fn test_images_mirrored() {
        let images = Images::default().mirrored(1);
        for (_, spec) in images.entries() {
            assert!(spec.starts_with("quay.io/k8stopologyawareschedwg/"));
            assert!(spec.contains(":r1-"));
        }
    }

    #[test]
    fn test_images_entries_order() {
        let images = Images::default();
        let roles: Vec<&str> = images.entries().iter().map(|(r, _)| *r).collect();
        assert_eq!(
            roles,
            vec![
                "resource-topology-exporter",
                "topology-updater",
                "scheduler-plugin",
                "scheduler-controller"
            ]
        );
    }
}
