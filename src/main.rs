//! EKS connection helper.
//!
//! This program resolves the base AWS profile for an environment, refreshes
//! temporary credentials through AWS STS when the stored ones have expired
//! (fetching the MFA one-time passcode from 1Password), writes them into the
//! derived `<env>2auth` profile, and updates the local kubeconfig for the
//! environment's EKS cluster.
//!
//! When the stored credentials are still valid, the MFA and STS steps are
//! skipped entirely and only the kubeconfig is updated.

use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod error;
mod issuer;
mod kube;
mod orchestrator;
mod otp;
mod profile;

use cli::Args;
use issuer::{IssuerConfig, StsIssuer};
use kube::AwsCli;
use orchestrator::{RefreshOrchestrator, SystemClock};
use otp::OnePassword;
use profile::ProfileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // INFO by default so each stage of the workflow is visible; RUST_LOG
    // overrides.
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let Args {
        environment,
        force_refresh,
        duration,
        config_path,
        credentials_path,
    } = Args::parse();

    let aws_dir = dirs::home_dir()
        .context("Could not determine home directory")?
        .join(".aws");
    let store = ProfileStore::new(
        config_path.unwrap_or_else(|| aws_dir.join("config")),
        credentials_path.unwrap_or_else(|| aws_dir.join("credentials")),
    );

    let issuer = StsIssuer::new(IssuerConfig::default(), store.clone());
    let orchestrator = RefreshOrchestrator::new(store, OnePassword, issuer, AwsCli, SystemClock);

    orchestrator
        .run(&environment, force_refresh, duration)
        .await?;
    Ok(())
}
