//! Command-line interface definitions.

use std::path::PathBuf;

use clap::Parser;

/// EKS connection helper with MFA and role support.
///
/// Resolves the base AWS profile for an environment, refreshes its temporary
/// credentials through STS when the stored ones have expired, and updates the
/// local kubeconfig for the environment's EKS cluster.
#[derive(Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Environment name, e.g. 'env-dev'
    pub environment: String,

    /// Force credential renewal even if the stored ones have not expired
    #[arg(long)]
    pub force_refresh: bool,

    /// Requested session duration in seconds; clamped to the STS maximum for
    /// the profile kind (3600 for roles, 129600 for IAM users)
    #[arg(short, long)]
    pub duration: Option<u32>,

    /// Path to the AWS config file [default: ~/.aws/config]
    #[arg(long, env = "AWS_CONFIG_FILE")]
    pub config_path: Option<PathBuf>,

    /// Path to the AWS credentials file [default: ~/.aws/credentials]
    #[arg(long, env = "AWS_SHARED_CREDENTIALS_FILE")]
    pub credentials_path: Option<PathBuf>,
}
