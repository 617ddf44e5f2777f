//! Subcommand implementations

pub mod intents;
pub mod render;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use operator_lib::KubeStore;

/// Connect to the cluster, from an explicit kubeconfig when one is given
pub async fn connect(kubeconfig: Option<&str>) -> Result<KubeStore> {
    let client = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path))?;
            let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Invalid kubeconfig")?;
            kube::Client::try_from(config).context("Failed to create Kubernetes client")?
        }
        None => kube::Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?,
    };
    Ok(KubeStore::new(client))
}
