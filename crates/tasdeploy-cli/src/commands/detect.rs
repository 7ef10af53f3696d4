//! Detect command - report platform, version and control-plane size

use console::style;
use serde::Serialize;
use tasdeploy_kube::{ClusterTarget, Deployer, count_control_plane_nodes};

use crate::GlobalArgs;
use crate::display;
use crate::error::Result;
use crate::settings;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectOutput {
    #[serde(flatten)]
    target: ClusterTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    control_plane_nodes: Option<usize>,
}

/// Run the detect command
pub async fn run(global: &GlobalArgs, control_plane: bool, json: bool) -> Result<()> {
    let platform = settings::platform_override(global)?;
    let client = super::connect().await?;

    let target = Deployer::new(&client).detect(&platform).await?;
    let control_plane_nodes = if control_plane {
        Some(count_control_plane_nodes(&client).await?)
    } else {
        None
    };

    if json {
        let output = DetectOutput {
            target,
            control_plane_nodes,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} Cluster", style("→").blue().bold());
    display::print_target(&target);
    if let Some(count) = control_plane_nodes {
        println!("  {:<10} {}", "control-plane", style(count).cyan().bold());
    }
    Ok(())
}
