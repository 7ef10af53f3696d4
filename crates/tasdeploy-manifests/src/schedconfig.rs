//! KubeSchedulerConfiguration rendering
//!
//! The configuration is edited as a generic YAML tree so user supplied
//! documents keep every field this crate does not know about.

use serde_yaml::{Mapping, Value};
use std::time::Duration;
use tasdeploy_core::{Platform, PlatformVersion, ScoringStrategy};

use crate::error::{ManifestError, Result};

/// ConfigMap key the scheduler reads its configuration from
pub const CONFIG_KEY: &str = "scheduler-config.yaml";

/// Scheduler plugin configured by the built-in profile
pub const PLUGIN_NAME: &str = "NodeResourceTopologyMatch";

pub const API_VERSION_V1: &str = "kubescheduler.config.k8s.io/v1";
pub const API_VERSION_V1BETA3: &str = "kubescheduler.config.k8s.io/v1beta3";

/// Values injected into the scheduler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfigParams<'a> {
    pub api_version: &'a str,
    pub profile_name: &'a str,
    pub cache_resync_period: Duration,
    pub scoring_strategy: ScoringStrategy,
    pub leader_elect: bool,
    pub resource_namespace: &'a str,
    pub resource_name: &'a str,
}

/// Configuration API served by the scheduler binary shipped for a platform
///
/// `v1` graduated in Kubernetes 1.25, which OpenShift ships as 4.12.
/// MicroShift follows OpenShift numbering.
pub fn api_version_for(platform: Platform, version: &PlatformVersion) -> &'static str {
    let min = match platform {
        Platform::Kubernetes => PlatformVersion::new(1, 25),
        _ => PlatformVersion::new(4, 12),
    };
    if version.at_least(&min) {
        API_VERSION_V1
    } else {
        API_VERSION_V1BETA3
    }
}

fn invalid(reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidPayload {
        what: "scheduler configuration".to_string(),
        reason: reason.into(),
    }
}

fn child_mapping<'a>(parent: &'a mut Mapping, key: &str) -> Result<&'a mut Mapping> {
    if !parent.get(key).is_some_and(Value::is_mapping) {
        parent.insert(Value::from(key), Value::Mapping(Mapping::new()));
    }
    parent
        .get_mut(key)
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| invalid(format!("'{}' is not a mapping", key)))
}

/// `args` of the plugin's pluginConfig entry, created when missing
fn plugin_args(profile: &mut Mapping) -> Result<&mut Mapping> {
    if !profile.get("pluginConfig").is_some_and(Value::is_sequence) {
        profile.insert(Value::from("pluginConfig"), Value::Sequence(Vec::new()));
    }
    let entries = profile
        .get_mut("pluginConfig")
        .and_then(Value::as_sequence_mut)
        .ok_or_else(|| invalid("'pluginConfig' is not a list"))?;

    let idx = match entries
        .iter()
        .position(|e| e.get("name").and_then(Value::as_str) == Some(PLUGIN_NAME))
    {
        Some(idx) => idx,
        None => {
            let mut entry = Mapping::new();
            entry.insert(Value::from("name"), Value::from(PLUGIN_NAME));
            entries.push(Value::Mapping(entry));
            entries.len() - 1
        }
    };
    let entry = entries[idx]
        .as_mapping_mut()
        .ok_or_else(|| invalid("pluginConfig entry is not a mapping"))?;
    child_mapping(entry, "args")
}

/// Render a scheduler configuration document
///
/// `builtin` documents receive every parameter. A user supplied document is
/// only touched for leader election, which always follows the replica count.
pub fn render_config(
    base: &str,
    params: &SchedulerConfigParams<'_>,
    builtin: bool,
) -> Result<String> {
    let mut doc: Value = serde_yaml::from_str(base).map_err(|e| invalid(e.to_string()))?;
    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| invalid("expected a YAML mapping"))?;

    if root.get("kind").and_then(Value::as_str) != Some("KubeSchedulerConfiguration") {
        return Err(invalid("kind must be KubeSchedulerConfiguration"));
    }
    if !root
        .get("profiles")
        .and_then(Value::as_sequence)
        .is_some_and(|p| !p.is_empty())
    {
        return Err(invalid("at least one profile is required"));
    }

    if builtin {
        root.insert(Value::from("apiVersion"), Value::from(params.api_version));

        let profile = root
            .get_mut("profiles")
            .and_then(Value::as_sequence_mut)
            .and_then(|p| p.first_mut())
            .and_then(Value::as_mapping_mut)
            .ok_or_else(|| invalid("profile is not a mapping"))?;
        profile.insert(Value::from("schedulerName"), Value::from(params.profile_name));

        let args = plugin_args(profile)?;
        args.insert(
            Value::from("cacheResyncPeriodSeconds"),
            Value::from(params.cache_resync_period.as_secs()),
        );
        let strategy = child_mapping(args, "scoringStrategy")?;
        strategy.insert(
            Value::from("type"),
            Value::from(params.scoring_strategy.as_str()),
        );
    }

    let election = child_mapping(root, "leaderElection")?;
    election.insert(Value::from("leaderElect"), Value::Bool(params.leader_elect));
    if params.leader_elect {
        election.insert(Value::from("resourceLock"), Value::from("leases"));
        election.insert(
            Value::from("resourceNamespace"),
            Value::from(params.resource_namespace),
        );
        election.insert(Value::from("resourceName"), Value::from(params.resource_name));
    }

    Ok(serde_yaml::to_string(&doc)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets;

    fn params(leader_elect: bool) -> SchedulerConfigParams<'static> {
        SchedulerConfigParams {
            api_version: API_VERSION_V1,
            profile_name: "numa-sched",
            cache_resync_period: Duration::from_secs(10),
            scoring_strategy: ScoringStrategy::MostAllocated,
            leader_elect,
            resource_namespace: "tas-scheduler",
            resource_name: "numa-sched",
        }
    }

    fn parse(rendered: &str) -> Value {
        serde_yaml::from_str(rendered).unwrap()
    }

    #[test]
    fn test_builtin_config_gets_all_params() {
        let base = assets::get("sched/config.yaml").unwrap();
        let doc = parse(&render_config(base, &params(false), true).unwrap());

        assert_eq!(doc["apiVersion"].as_str(), Some(API_VERSION_V1));
        assert_eq!(doc["profiles"][0]["schedulerName"].as_str(), Some("numa-sched"));
        let args = &doc["profiles"][0]["pluginConfig"][0]["args"];
        assert_eq!(args["cacheResyncPeriodSeconds"].as_u64(), Some(10));
        assert_eq!(args["scoringStrategy"]["type"].as_str(), Some("MostAllocated"));
        assert_eq!(doc["leaderElection"]["leaderElect"].as_bool(), Some(false));
    }

    #[test]
    fn test_leader_election_target() {
        let base = assets::get("sched/config.yaml").unwrap();
        let doc = parse(&render_config(base, &params(true), true).unwrap());
        let election = &doc["leaderElection"];
        assert_eq!(election["leaderElect"].as_bool(), Some(true));
        assert_eq!(election["resourceNamespace"].as_str(), Some("tas-scheduler"));
        assert_eq!(election["resourceName"].as_str(), Some("numa-sched"));
    }

    #[test]
    fn test_user_config_only_gets_leader_election() {
        let user = "\
apiVersion: kubescheduler.config.k8s.io/v1beta3
kind: KubeSchedulerConfiguration
profiles:
  - schedulerName: custom
";
        let doc = parse(&render_config(user, &params(true), false).unwrap());
        assert_eq!(doc["apiVersion"].as_str(), Some(API_VERSION_V1BETA3));
        assert_eq!(doc["profiles"][0]["schedulerName"].as_str(), Some("custom"));
        assert!(doc["profiles"][0].get("pluginConfig").is_none());
        assert_eq!(doc["leaderElection"]["leaderElect"].as_bool(), Some(true));
    }

    #[test]
    fn test_plugin_config_created_when_missing() {
        let base = "kind: KubeSchedulerConfiguration\nprofiles:\n  - schedulerName: x\n";
        let doc = parse(&render_config(base, &params(false), true).unwrap());
        let entry = &doc["profiles"][0]["pluginConfig"][0];
        assert_eq!(entry["name"].as_str(), Some(PLUGIN_NAME));
        assert_eq!(entry["args"]["cacheResyncPeriodSeconds"].as_u64(), Some(10));
    }

    #[test]
    fn test_malformed_config() {
        for bad in [
            "profiles: [",
            "- a\n- b\n",
            "kind: Pod\nprofiles: [{}]\n",
            "kind: KubeSchedulerConfiguration\nprofiles: []\n",
        ] {
            let err = render_config(bad, &params(false), false).unwrap_err();
            assert!(
                matches!(err, ManifestError::InvalidPayload { .. }),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let base = assets::get("sched/config.yaml").unwrap();
        let a = render_config(base, &params(true), true).unwrap();
        let b = render_config(&a, &params(true), true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_api_version_per_platform() {
        assert_eq!(
            api_version_for(Platform::Kubernetes, &PlatformVersion::new(1, 24)),
            API_VERSION_V1BETA3
        );
        assert_eq!(
            api_version_for(Platform::Kubernetes, &PlatformVersion::new(1, 25)),
            API_VERSION_V1
        );
        assert_eq!(
            api_version_for(Platform::OpenShift, &PlatformVersion::new(4, 11)),
            API_VERSION_V1BETA3
        );
        assert_eq!(
            api_version_for(Platform::MicroShift, &PlatformVersion::new(4, 14)),
            API_VERSION_V1
        );
    }
}
