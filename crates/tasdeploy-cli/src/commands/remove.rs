//! Remove command - delete the components from the cluster

use console::style;
use tasdeploy_kube::{Deployer, KubeError};
use tasdeploy_manifests::Component;

use crate::GlobalArgs;
use crate::display;
use crate::error::Result;
use crate::settings;

/// Run the remove command
pub async fn run(global: &GlobalArgs, component: Option<Component>) -> Result<()> {
    let opts = settings::deploy_options(global)?;
    let client = super::connect().await?;
    let deployer = Deployer::new(&client);
    let components: Vec<Component> = component.into_iter().collect();

    println!(
        "{} Removing {}",
        style("→").blue().bold(),
        component
            .map(|c| c.to_string())
            .unwrap_or_else(|| "all components".to_string())
    );

    match deployer.remove(&components, &opts).await {
        Ok(report) => {
            display::print_target(&report.target);
            display::print_run(&report, "removed");
            Ok(())
        }
        Err(e @ KubeError::RemovalIncomplete { .. }) => {
            display::print_removal_failures(e.removal_failures());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
