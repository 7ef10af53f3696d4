//! Render options for the managed sub-systems
//!
//! Options are plain records supplied by the caller before rendering. The
//! renderer only reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Container image pull policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullPolicy {
    #[default]
    Always,
    IfNotPresent,
}

impl PullPolicy {
    pub fn from_flag(pull_if_not_present: bool) -> Self {
        if pull_if_not_present {
            Self::IfNotPresent
        } else {
            Self::Always
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
        }
    }
}

/// Which updater populates the NodeResourceTopology objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdaterKind {
    /// resource-topology-exporter
    #[default]
    Rte,
    /// node-feature-discovery topology updater
    Nfd,
}

impl fmt::Display for UpdaterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rte => write!(f, "rte"),
            Self::Nfd => write!(f, "nfd"),
        }
    }
}

impl FromStr for UpdaterKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rte" | "resource-topology-exporter" => Ok(Self::Rte),
            "nfd" | "nfd-topology-updater" => Ok(Self::Nfd),
            other => Err(CoreError::InvalidOption {
                name: "updater-type".to_string(),
                reason: format!("unknown updater '{}', expected rte or nfd", other),
            }),
        }
    }
}

/// Scoring strategy of the NodeResourceTopologyMatch plugin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringStrategy {
    #[default]
    LeastAllocated,
    MostAllocated,
    BalancedAllocation,
    #[serde(rename = "LeastNUMANodes")]
    LeastNumaNodes,
}

impl ScoringStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeastAllocated => "LeastAllocated",
            Self::MostAllocated => "MostAllocated",
            Self::BalancedAllocation => "BalancedAllocation",
            Self::LeastNumaNodes => "LeastNUMANodes",
        }
    }
}

impl FromStr for ScoringStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LeastAllocated" => Ok(Self::LeastAllocated),
            "MostAllocated" => Ok(Self::MostAllocated),
            "BalancedAllocation" => Ok(Self::BalancedAllocation),
            "LeastNUMANodes" => Ok(Self::LeastNumaNodes),
            other => Err(CoreError::InvalidOption {
                name: "scoring-strategy".to_string(),
                reason: format!("unknown scoring strategy '{}'", other),
            }),
        }
    }
}

/// Lease object the scheduler replicas compete for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderElectionResource {
    pub namespace: String,
    pub name: String,
}

impl FromStr for LeaderElectionResource {
    type Err = CoreError;

    /// Parses `namespace/name`
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self {
                    namespace: ns.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(CoreError::InvalidOption {
                name: "leader-election-resource".to_string(),
                reason: format!("expected namespace/name, got '{}'", s),
            }),
        }
    }
}

/// Options for the API definition sub-system
///
/// The CustomResourceDefinition has no tunables yet; the record exists so
/// every sub-system renders through the same interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiOptions {}

/// Options for the topology updater sub-system (RTE or NFD)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdaterOptions {
    pub kind: UpdaterKind,
    pub namespace: Option<String>,
    pub pull_policy: PullPolicy,
    /// Replaces the default updater image
    pub image: Option<String>,
    pub verbose: u8,
    #[serde(with = "humantime_serde")]
    pub sync_period: Duration,
    /// Publish the pod fingerprint attribute (RTE only)
    pub pods_fingerprint: bool,
    /// Install the OCI hook that pokes the exporter on container changes (RTE only)
    pub notifier: bool,
    /// Exporter configuration document, stored verbatim in a ConfigMap
    pub config_data: Option<String>,
    pub node_selector: BTreeMap<String, String>,
    /// Also run on control-plane nodes
    pub ctrl_plane_tolerations: bool,
    pub network_policies: bool,
    /// Rewrite images to the mirror registry with this revision
    pub mirror_revision: Option<u32>,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            kind: UpdaterKind::default(),
            namespace: None,
            pull_policy: PullPolicy::default(),
            image: None,
            verbose: 1,
            sync_period: Duration::from_secs(10),
            pods_fingerprint: true,
            notifier: false,
            config_data: None,
            node_selector: BTreeMap::new(),
            ctrl_plane_tolerations: false,
            network_policies: false,
            mirror_revision: None,
        }
    }
}

/// Options for the secondary scheduler sub-system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerOptions {
    pub namespace: Option<String>,
    pub pull_policy: PullPolicy,
    pub image: Option<String>,
    pub controller_image: Option<String>,
    /// Scheduler replicas; 0 means one per control-plane node
    pub replicas: i32,
    pub profile_name: String,
    #[serde(with = "humantime_serde")]
    pub cache_resync_period: Duration,
    pub scoring_strategy: ScoringStrategy,
    pub leader_election_resource: Option<LeaderElectionResource>,
    /// Full KubeSchedulerConfiguration document replacing the built-in one
    pub config_data: Option<String>,
    pub verbose: u8,
    /// Pin the scheduler to control-plane nodes
    pub ctrl_plane_affinity: bool,
    pub network_policies: bool,
    pub mirror_revision: Option<u32>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            pull_policy: PullPolicy::default(),
            image: None,
            controller_image: None,
            replicas: 1,
            profile_name: DEFAULT_SCHEDULER_PROFILE.to_string(),
            cache_resync_period: Duration::from_secs(5),
            scoring_strategy: ScoringStrategy::default(),
            leader_election_resource: None,
            config_data: None,
            verbose: 3,
            ctrl_plane_affinity: true,
            network_policies: false,
            mirror_revision: None,
        }
    }
}

/// Scheduler profile name used when none is given
pub const DEFAULT_SCHEDULER_PROFILE: &str = "topology-aware-scheduler";

impl SchedulerOptions {
    /// Leader election follows the replica count and is never set directly
    pub fn leader_election(&self) -> bool {
        self.replicas > 1
    }

    /// Copy of these options with a different replica count
    pub fn with_replicas(&self, replicas: i32) -> Self {
        Self {
            replicas,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.replicas < 0 {
            return Err(CoreError::InvalidOption {
                name: "sched-replicas".to_string(),
                reason: format!("must not be negative, got {}", self.replicas),
            });
        }
        if self.profile_name.trim().is_empty() {
            return Err(CoreError::InvalidOption {
                name: "sched-profile-name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leader_election_follows_replicas() {
        let opts = SchedulerOptions::default();
        assert!(!opts.leader_election());

        let opts = opts.with_replicas(2);
        assert!(opts.leader_election());

        let opts = opts.with_replicas(1);
        assert!(!opts.leader_election());
    }

    #[test]
    fn test_updater_kind_parse() {
        assert_eq!("rte".parse::<UpdaterKind>().unwrap(), UpdaterKind::Rte);
        assert_eq!("NFD".parse::<UpdaterKind>().unwrap(), UpdaterKind::Nfd);
        assert!("kubelet".parse::<UpdaterKind>().is_err());
    }

    #[test]
    fn test_leader_election_resource_parse() {
        let r: LeaderElectionResource = "kube-system/topo-sched".parse().unwrap();
        assert_eq!(r.namespace, "kube-system");
        assert_eq!(r.name, "topo-sched");
        assert!("no-slash".parse::<LeaderElectionResource>().is_err());
        assert!("/name".parse::<LeaderElectionResource>().is_err());
        assert!("a/b/c".parse::<LeaderElectionResource>().is_err());
    }

    #[test]
    fn test_scheduler_options_validate() {
        assert!(SchedulerOptions::default().validate().is_ok());
        assert!(SchedulerOptions::default().with_replicas(-1).validate().is_err());
        let opts = SchedulerOptions {
            profile_name: " ".to_string(),
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_scoring_strategy_names() {
        assert_eq!(ScoringStrategy::LeastNumaNodes.as_str(), "LeastNUMANodes");
        assert_eq!(
            "LeastNUMANodes".parse::<ScoringStrategy>().unwrap(),
            ScoringStrategy::LeastNumaNodes
        );
        assert!("Random".parse::<ScoringStrategy>().is_err());
    }

    #[test]
    fn test_pull_policy_from_flag() {
        assert_eq!(PullPolicy::from_flag(true).as_str(), "IfNotPresent");
        assert_eq!(PullPolicy::from_flag(false).as_str(), "Always");
    }
}
