//! Kubeconfig updates via the AWS CLI.

use std::process::Command;

use log::info;

use crate::error::{Error, Result};

/// Updates the local kubeconfig to point at an EKS cluster. Injected so tests
/// can substitute a recording fake.
pub trait ClusterConnector {
    fn connect(&self, cluster_name: &str, region: &str, profile: &str) -> Result<()>;
}

/// Runs `aws eks update-kubeconfig`, which merges the cluster, context and
/// user entries into the kubeconfig so kubectl authenticates through the
/// given profile.
pub struct AwsCli;

impl ClusterConnector for AwsCli {
    fn connect(&self, cluster_name: &str, region: &str, profile: &str) -> Result<()> {
        info!("Updating kubeconfig for cluster '{cluster_name}' using profile '{profile}'");

        let failed = |message: String| Error::ClusterConnect {
            cluster: cluster_name.to_string(),
            message,
        };

        let output = Command::new("aws")
            .args([
                "eks",
                "update-kubeconfig",
                "--name",
                cluster_name,
                "--region",
                region,
                "--profile",
                profile,
            ])
            .output()
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            // The CLI's own message ("cluster not found", auth failures) is
            // the only useful diagnostic; pass it through untouched.
            return Err(failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        info!("Kubeconfig updated for cluster '{cluster_name}'");
        Ok(())
    }
}
