//! Assemble run options from the settings file and the command line
//!
//! Precedence, lowest first: built-in defaults, `--settings` file, flags
//! (or their `TASDEPLOY_*` environment variables).

use std::path::Path;
use tasdeploy_core::{PlatformOverride, PullPolicy, Settings, UpdaterKind};
use tasdeploy_kube::{DeployOptions, RenderOptions, WaitOptions};

use crate::GlobalArgs;
use crate::error::{CliError, Result};

fn read_document(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CliError::Io {
        message: format!("cannot read {} file {}: {}", what, path.display(), e),
    })
}

fn load_settings(global: &GlobalArgs) -> Result<Settings> {
    match &global.settings {
        Some(path) => Settings::from_file(path).map_err(|e| {
            CliError::usage_with_help(
                format!("invalid settings file {}: {}", path.display(), e),
                "settings use the camelCase option names, e.g. scheduler.replicas",
            )
        }),
        None => Ok(Settings::default()),
    }
}

/// Platform override from the flag, else from the settings file
pub fn platform_override(global: &GlobalArgs) -> Result<PlatformOverride> {
    let settings = load_settings(global)?;
    resolve_platform(global, &settings)
}

fn resolve_platform(global: &GlobalArgs, settings: &Settings) -> Result<PlatformOverride> {
    let spec = global.platform.as_deref().or(settings.platform.as_deref());
    match spec {
        Some(spec) => spec.parse::<PlatformOverride>().map_err(|e| {
            CliError::usage_with_help(
                e.to_string(),
                "expected kind[:version], e.g. kubernetes:v1.29 or openshift:4.14",
            )
        }),
        None => Ok(PlatformOverride::default()),
    }
}

/// Full options of a deploy, remove or render run
pub fn deploy_options(global: &GlobalArgs) -> Result<DeployOptions> {
    let settings = load_settings(global)?;
    let platform = resolve_platform(global, &settings)?;

    let Settings {
        mut updater,
        mut scheduler,
        wait,
        ..
    } = settings;

    if let Some(kind) = &global.updater_type {
        updater.kind = kind.parse()?;
    }
    if let Some(ns) = &global.updater_namespace {
        updater.namespace = Some(ns.clone());
    }
    if let Some(v) = global.updater_verbose {
        updater.verbose = v;
    }
    if let Some(period) = global.updater_sync_period {
        updater.sync_period = period;
    }
    if let Some(enabled) = global.updater_pfp_enable {
        updater.pods_fingerprint = enabled;
    }
    if let Some(enabled) = global.updater_notif_enable {
        updater.notifier = enabled;
    }
    if let Some(enabled) = global.updater_ctrlplane_tolerations {
        updater.ctrl_plane_tolerations = enabled;
    }
    if let Some(path) = &global.rte_config_file {
        updater.config_data = Some(read_document(path, "exporter config")?);
    }
    let updater_image = match updater.kind {
        UpdaterKind::Rte => &global.rte_image,
        UpdaterKind::Nfd => &global.nfd_image,
    };
    if let Some(image) = updater_image {
        updater.image = Some(image.clone());
    }

    if let Some(ns) = &global.sched_namespace {
        scheduler.namespace = Some(ns.clone());
    }
    if let Some(replicas) = global.sched_replicas {
        scheduler.replicas = replicas;
    }
    if let Some(enabled) = global.sched_ctrlplane_affinity {
        scheduler.ctrl_plane_affinity = enabled;
    }
    if let Some(v) = global.sched_verbose {
        scheduler.verbose = v;
    }
    if let Some(name) = &global.sched_profile_name {
        scheduler.profile_name = name.clone();
    }
    if let Some(period) = global.sched_cache_resync_period {
        scheduler.cache_resync_period = period;
    }
    if let Some(strategy) = &global.sched_scoring_strategy {
        scheduler.scoring_strategy = strategy.parse()?;
    }
    if let Some(resource) = &global.sched_leader_election_resource {
        scheduler.leader_election_resource = Some(resource.parse()?);
    }
    if let Some(path) = &global.sched_config_file {
        scheduler.config_data = Some(read_document(path, "scheduler config")?);
    }
    if let Some(image) = &global.sched_image {
        scheduler.image = Some(image.clone());
    }
    if let Some(image) = &global.sched_ctrl_image {
        scheduler.controller_image = Some(image.clone());
    }

    if let Some(pull) = global.pull_if_not_present {
        updater.pull_policy = PullPolicy::from_flag(pull);
        scheduler.pull_policy = PullPolicy::from_flag(pull);
    }
    if let Some(enabled) = global.enable_network_policies {
        updater.network_policies = enabled;
        scheduler.network_policies = enabled;
    }
    if let Some(rev) = global.image_mirror_revision {
        updater.mirror_revision = Some(rev);
        scheduler.mirror_revision = Some(rev);
    }

    scheduler.validate()?;

    let wait = global.wait.unwrap_or(wait.enabled).then(|| {
        WaitOptions::new(
            global.wait_interval.unwrap_or(wait.interval),
            global.wait_timeout.unwrap_or(wait.timeout),
        )
    });

    Ok(DeployOptions {
        platform,
        render: RenderOptions {
            api: Default::default(),
            updater,
            scheduler,
        },
        wait,
    })
}
