//! Setup command - validate, then deploy everything

use console::style;
use tasdeploy_kube::Deployer;

use crate::GlobalArgs;
use crate::display;
use crate::error::Result;
use crate::settings;

/// Run the setup command
pub async fn run(global: &GlobalArgs) -> Result<()> {
    let opts = settings::deploy_options(global)?;
    let client = super::connect().await?;

    println!("{} Validating cluster configuration", style("→").blue().bold());
    let report = super::validate::check(&client, &opts.platform).await?;
    display::print_validation(&report);
    if let Err(e) = super::validate::outcome(&report) {
        eprintln!(
            "{} Skipping deployment, the cluster is not ready",
            style("✗").red().bold()
        );
        return Err(e);
    }

    println!();
    super::deploy::execute(&Deployer::new(&client), None, &opts).await
}
