//! The refresh-and-connect workflow.
//!
//! One invocation walks a fixed sequence: resolve the base profile, check the
//! stored expiry, refresh credentials if needed (OTP, STS, persist), then
//! update the kubeconfig. Every failure is terminal; the user re-invokes the
//! command after fixing the cause.

use chrono::{DateTime, Utc};
use log::info;

use crate::error::Result;
use crate::issuer::CredentialIssuer;
use crate::kube::ClusterConnector;
use crate::otp::{OtpProvider, otp_item_name};
use crate::profile::ProfileStore;

/// Wall-clock source for the expiry comparison, injected so the fast-path
/// decision is testable at a fixed instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct RefreshOrchestrator<O, I, C, K> {
    store: ProfileStore,
    otp: O,
    issuer: I,
    connector: C,
    clock: K,
}

impl<O, I, C, K> RefreshOrchestrator<O, I, C, K>
where
    O: OtpProvider,
    I: CredentialIssuer,
    C: ClusterConnector,
    K: Clock,
{
    pub fn new(store: ProfileStore, otp: O, issuer: I, connector: C, clock: K) -> Self {
        Self {
            store,
            otp,
            issuer,
            connector,
            clock,
        }
    }

    /// Runs the full workflow for an environment argument. With valid stored
    /// credentials and no forced refresh, the OTP and STS steps are skipped
    /// entirely and only the kubeconfig is updated.
    pub async fn run(
        &self,
        env_arg: &str,
        force_refresh: bool,
        requested_duration: Option<u32>,
    ) -> Result<()> {
        let profile = self.store.resolve_base_profile(env_arg)?;
        let auth_name = ProfileStore::auth_profile_name(&profile.name);

        if !force_refresh && self.stored_credentials_valid(&auth_name)? {
            info!("Using existing credentials for '{auth_name}'");
        } else {
            info!(
                "Credentials are expired or refresh was forced; renewing '{}' ({})",
                profile.name,
                if profile.is_role_based() {
                    "role profile"
                } else {
                    "IAM user profile"
                }
            );

            let item = otp_item_name(&profile);
            let otp = self.otp.fetch_otp(&item)?;
            let credentials = self.issuer.issue(&profile, &otp, requested_duration).await?;
            self.store
                .persist_auth_state(&auth_name, &profile, &credentials)?;

            info!(
                "Credentials for '{auth_name}' expire at {}",
                credentials.expiry.to_rfc3339()
            );
        }

        self.connector
            .connect(&profile.cluster_name, &profile.region, &auth_name)
    }

    // Valid means a stored expiry that parses and lies strictly after now.
    // A missing section, missing timestamp or unparsable timestamp all force
    // a refresh.
    fn stored_credentials_valid(&self, auth_name: &str) -> Result<bool> {
        Ok(match self.store.load_auth_state(auth_name)? {
            Some(state) => matches!(state.expiry, Some(expiry) if expiry > self.clock.now()),
            None => false,
        })
    }
}
