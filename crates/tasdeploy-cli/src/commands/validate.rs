//! Validate command - check the cluster configuration

use console::style;
use tasdeploy_kube::{ClusterClient, Deployer, ValidationReport, validate_cluster};
use tasdeploy_core::PlatformOverride;

use crate::GlobalArgs;
use crate::display;
use crate::error::{CliError, Result};
use crate::settings;

/// Detect the target and run every check
pub async fn check(
    client: &dyn ClusterClient,
    platform: &PlatformOverride,
) -> Result<ValidationReport> {
    let target = Deployer::new(client).detect(platform).await?;
    Ok(validate_cluster(client, &target).await?)
}

/// Fail with the validation exit code when an error-level check failed
pub fn outcome(report: &ValidationReport) -> Result<()> {
    if report.is_success() {
        Ok(())
    } else {
        Err(CliError::ValidationFailed {
            errors: report.errors().count(),
        })
    }
}

/// Run the validate command
pub async fn run(global: &GlobalArgs, json: bool) -> Result<()> {
    let platform = settings::platform_override(global)?;
    let client = super::connect().await?;

    if !json {
        println!("{} Validating cluster configuration", style("→").blue().bold());
    }
    let report = check(&client, &platform).await?;

    if json {
        let output = serde_json::json!({
            "valid": report.is_success(),
            "nodes": report.nodes,
            "results": report.results,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display::print_validation(&report);
    }
    outcome(&report)
}
