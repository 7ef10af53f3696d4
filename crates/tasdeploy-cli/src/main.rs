//! tasdeploy CLI - deploy topology-aware scheduling components

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tasdeploy_manifests::Component;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod build_info;
mod commands;
mod display;
mod error;
mod exit_codes;
mod settings;

use error::Result;

#[derive(Parser)]
#[command(name = "tasdeploy")]
#[command(author = "tasdeploy Contributors")]
#[command(version)]
#[command(
    about = "Deploy the topology-aware scheduler, its API and the topology updater",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Flags shared by every command
///
/// Each flag can also come from a `TASDEPLOY_*` environment variable. Flags
/// left unset keep the value of the settings file, or the built-in default.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// YAML settings file providing defaults for every option
    #[arg(long, global = true, env = "TASDEPLOY_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Target platform as kind[:version], skips detection
    #[arg(long, global = true, env = "TASDEPLOY_PLATFORM")]
    pub platform: Option<String>,

    /// Wait for objects to become ready (or gone)
    #[arg(long, global = true, env = "TASDEPLOY_WAIT", num_args = 0..=1, default_missing_value = "true")]
    pub wait: Option<bool>,

    /// Poll interval while waiting (e.g. 2s)
    #[arg(long, global = true, env = "TASDEPLOY_WAIT_INTERVAL", value_parser = parse_duration)]
    pub wait_interval: Option<Duration>,

    /// Give up waiting after this long (e.g. 3m)
    #[arg(long, global = true, env = "TASDEPLOY_WAIT_TIMEOUT", value_parser = parse_duration)]
    pub wait_timeout: Option<Duration>,

    /// Use IfNotPresent instead of Always as image pull policy
    #[arg(long, global = true, env = "TASDEPLOY_PULL_IF_NOT_PRESENT", num_args = 0..=1, default_missing_value = "true")]
    pub pull_if_not_present: Option<bool>,

    /// Install default-deny network policies in the component namespaces
    #[arg(long, global = true, env = "TASDEPLOY_ENABLE_NETWORK_POLICIES", num_args = 0..=1, default_missing_value = "true")]
    pub enable_network_policies: Option<bool>,

    /// Rewrite every image to the mirror registry with this revision
    #[arg(long, global = true, env = "TASDEPLOY_IMAGE_MIRROR_REVISION")]
    pub image_mirror_revision: Option<u32>,

    /// Topology updater to deploy: rte or nfd
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_TYPE")]
    pub updater_type: Option<String>,

    /// Namespace of the topology updater
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_NAMESPACE")]
    pub updater_namespace: Option<String>,

    /// Verbosity of the topology updater
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_VERBOSE")]
    pub updater_verbose: Option<u8>,

    /// How often the topology updater refreshes its report (e.g. 10s)
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_SYNC_PERIOD", value_parser = parse_duration)]
    pub updater_sync_period: Option<Duration>,

    /// Publish the pod fingerprint attribute (RTE only)
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_PFP_ENABLE", num_args = 0..=1, default_missing_value = "true")]
    pub updater_pfp_enable: Option<bool>,

    /// Install the container-change notifier hook (RTE only)
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_NOTIF_ENABLE", num_args = 0..=1, default_missing_value = "true")]
    pub updater_notif_enable: Option<bool>,

    /// Also run the topology updater on control-plane nodes
    #[arg(long, global = true, env = "TASDEPLOY_UPDATER_CTRLPLANE_TOLERATIONS", num_args = 0..=1, default_missing_value = "true")]
    pub updater_ctrlplane_tolerations: Option<bool>,

    /// Exporter configuration file, stored verbatim in a ConfigMap
    #[arg(long, global = true, env = "TASDEPLOY_RTE_CONFIG_FILE")]
    pub rte_config_file: Option<PathBuf>,

    /// Resource-topology-exporter image
    #[arg(long, global = true, env = "TASDEPLOY_RTE_IMAGE")]
    pub rte_image: Option<String>,

    /// NFD topology updater image
    #[arg(long, global = true, env = "TASDEPLOY_NFD_IMAGE")]
    pub nfd_image: Option<String>,

    /// Namespace of the scheduler
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_NAMESPACE")]
    pub sched_namespace: Option<String>,

    /// Scheduler replicas; 0 runs one per control-plane node
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_REPLICAS")]
    pub sched_replicas: Option<i32>,

    /// Pin the scheduler to control-plane nodes
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_CTRLPLANE_AFFINITY", num_args = 0..=1, default_missing_value = "true")]
    pub sched_ctrlplane_affinity: Option<bool>,

    /// Verbosity of the scheduler
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_VERBOSE")]
    pub sched_verbose: Option<u8>,

    /// Scheduler profile name, also the schedulerName pods refer to
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_PROFILE_NAME")]
    pub sched_profile_name: Option<String>,

    /// Resync period of the scheduler topology cache (e.g. 5s)
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_CACHE_RESYNC_PERIOD", value_parser = parse_duration)]
    pub sched_cache_resync_period: Option<Duration>,

    /// Scoring strategy of the topology match plugin
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_SCORING_STRATEGY")]
    pub sched_scoring_strategy: Option<String>,

    /// Lease used for leader election, as namespace/name
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_LEADER_ELECTION_RESOURCE")]
    pub sched_leader_election_resource: Option<String>,

    /// KubeSchedulerConfiguration file replacing the built-in one
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_CONFIG_FILE")]
    pub sched_config_file: Option<PathBuf>,

    /// Scheduler image
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_IMAGE")]
    pub sched_image: Option<String>,

    /// Scheduler topology cache controller image
    #[arg(long, global = true, env = "TASDEPLOY_SCHED_CTRL_IMAGE")]
    pub sched_ctrl_image: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy all components, or only the one given
    Deploy {
        /// api, topology-updater or scheduler-plugin
        component: Option<Component>,
    },

    /// Remove all components, or only the one given
    Remove {
        /// api, topology-updater or scheduler-plugin
        component: Option<Component>,
    },

    /// Print the manifests as a YAML stream without touching a cluster
    Render {
        /// api, topology-updater or scheduler-plugin
        component: Option<Component>,
    },

    /// Detect the cluster platform and version
    Detect {
        /// Also count the control-plane nodes
        #[arg(long)]
        control_plane: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the component images
    Images {
        /// Output as JSON
        #[arg(long, conflicts_with_all = ["raw", "sha"])]
        json: bool,

        /// One pull spec per line
        #[arg(long, conflicts_with = "sha")]
        raw: bool,

        /// Mirrored pull specs of this build
        #[arg(long)]
        sha: bool,
    },

    /// Check the cluster configuration required by the scheduler
    Validate {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the cluster, then deploy everything if it passed
    Setup,

    /// Print version information
    Version {
        /// Include the commit and build target
        #[arg(long, conflicts_with = "hash")]
        full: bool,

        /// Print only the commit
        #[arg(long)]
        hash: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let global = &cli.global;
    match cli.command {
        Commands::Deploy { component } => commands::deploy::run(global, component).await,
        Commands::Remove { component } => commands::remove::run(global, component).await,
        Commands::Render { component } => commands::render::run(global, component),
        Commands::Detect {
            control_plane,
            json,
        } => commands::detect::run(global, control_plane, json).await,
        Commands::Images { json, raw, sha } => commands::images::run(global, json, raw, sha),
        Commands::Validate { json } => commands::validate::run(global, json).await,
        Commands::Setup => commands::setup::run(global).await,
        Commands::Version { full, hash } => {
            commands::version::run(full, hash);
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            std::process::exit(code);
        }
    };

    init_tracing(cli.global.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
