//! Settings file support
//!
//! A YAML settings file can carry every render option. Values given on the
//! command line are applied on top of the file by the CLI.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::options::{SchedulerOptions, UpdaterOptions};

/// Contents of a `--settings` file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// `kind[:version]`, same syntax as `--platform`
    pub platform: Option<String>,
    pub updater: UpdaterOptions,
    pub scheduler: SchedulerOptions,
    pub wait: WaitSettings,
}

/// Polling parameters for readiness waits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitSettings {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(180),
        }
    }
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{ScoringStrategy, UpdaterKind};
    use std::io::Write;

    #[test]
    fn test_settings_defaults_for_empty_document() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.wait.timeout, Duration::from_secs(180));
    }

    #[test]
    fn test_settings_partial_document() {
        let yaml = r#"
platform: openshift:4.14
updater:
  kind: nfd
  syncPeriod: 30s
scheduler:
  replicas: 2
  scoringStrategy: MostAllocated
  cacheResyncPeriod: 1m
wait:
  enabled: true
  timeout: 5m
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.platform.as_deref(), Some("openshift:4.14"));
        assert_eq!(settings.updater.kind, UpdaterKind::Nfd);
        assert_eq!(settings.updater.sync_period, Duration::from_secs(30));
        assert!(settings.updater.pods_fingerprint);
        assert_eq!(settings.scheduler.replicas, 2);
        assert!(settings.scheduler.leader_election());
        assert_eq!(settings.scheduler.scoring_strategy, ScoringStrategy::MostAllocated);
        assert_eq!(settings.scheduler.cache_resync_period, Duration::from_secs(60));
        assert!(settings.wait.enabled);
        assert_eq!(settings.wait.timeout, Duration::from_secs(300));
        assert_eq!(settings.wait.interval, Duration::from_secs(2));
    }

    #[test]
    fn test_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  verbose: 6").unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.scheduler.verbose, 6);
    }

    #[test]
    fn test_settings_invalid_yaml() {
        assert!(Settings::from_yaml("scheduler: [unclosed").is_err());
    }
}
