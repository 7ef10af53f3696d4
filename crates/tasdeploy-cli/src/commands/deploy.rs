//! Deploy command - create the components on the cluster

use console::style;
use tasdeploy_kube::{DeployOptions, Deployer};
use tasdeploy_manifests::Component;

use crate::GlobalArgs;
use crate::display;
use crate::error::Result;
use crate::settings;

/// Run the deploy command
pub async fn run(global: &GlobalArgs, component: Option<Component>) -> Result<()> {
    let opts = settings::deploy_options(global)?;
    let client = super::connect().await?;
    execute(&Deployer::new(&client), component, &opts).await
}

/// Deploy with an already connected deployer
pub async fn execute(
    deployer: &Deployer<'_>,
    component: Option<Component>,
    opts: &DeployOptions,
) -> Result<()> {
    let components: Vec<Component> = component.into_iter().collect();

    println!(
        "{} Deploying {}{}",
        style("→").blue().bold(),
        component
            .map(|c| c.to_string())
            .unwrap_or_else(|| "all components".to_string()),
        if opts.wait.is_some() { " (waiting for readiness)" } else { "" }
    );

    let report = deployer.deploy(&components, opts).await?;
    display::print_target(&report.target);
    display::print_run(&report, "deployed");
    Ok(())
}
