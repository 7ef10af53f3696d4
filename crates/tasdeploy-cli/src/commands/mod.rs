//! CLI commands

pub mod deploy;
pub mod detect;
pub mod images;
pub mod remove;
pub mod render;
pub mod setup;
pub mod validate;
pub mod version;

use tasdeploy_kube::KubeClusterClient;

use crate::error::Result;

/// Client for the cluster of the current kubeconfig context
async fn connect() -> Result<KubeClusterClient> {
    Ok(KubeClusterClient::try_default().await?)
}
