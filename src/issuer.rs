//! Temporary credential issuance through AWS STS.
//!
//! Role-based profiles (a `role_arn` plus a `source_profile`) go through
//! AssumeRole using the source profile's long-lived credentials; plain IAM
//! user profiles go through GetSessionToken with their own. Both paths carry
//! the profile's MFA serial and the current OTP.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_sts::{Client, config::Credentials, error::DisplayErrorContext, types};
use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::profile::{LongLivedCredentials, Profile, ProfileStore};

/// Duration caps requested from STS, per profile kind. IAM role sessions are
/// limited by the role's MaxSessionDuration; user sessions may run far longer.
#[derive(Debug, Clone, Copy)]
pub struct IssuerConfig {
    pub role_max_duration: u32,
    pub user_max_duration: u32,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            role_max_duration: 3_600,
            user_max_duration: 129_600,
        }
    }
}

/// The output of one issuance call. Held only for the duration of a refresh,
/// then persisted into the derived auth profile and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryCredentialSet {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiry: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialIssuer {
    /// Exchanges long-lived credentials plus an OTP for a temporary set.
    /// `requested` durations above the applicable cap are clamped, never
    /// rejected.
    async fn issue(
        &self,
        profile: &Profile,
        otp: &str,
        requested: Option<u32>,
    ) -> Result<TemporaryCredentialSet>;
}

pub struct StsIssuer {
    config: IssuerConfig,
    store: ProfileStore,
}

impl StsIssuer {
    pub fn new(config: IssuerConfig, store: ProfileStore) -> Self {
        Self { config, store }
    }

    async fn client(&self, caller: &LongLivedCredentials, region: &str) -> Client {
        let provider = Credentials::new(
            caller.access_key_id.clone(),
            caller.secret_access_key.clone(),
            caller.session_token.clone(),
            None,
            "eks-connect",
        );
        let config = aws_config::from_env()
            .credentials_provider(provider)
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Client::new(&config)
    }
}

#[async_trait]
impl CredentialIssuer for StsIssuer {
    async fn issue(
        &self,
        profile: &Profile,
        otp: &str,
        requested: Option<u32>,
    ) -> Result<TemporaryCredentialSet> {
        let serial = profile.mfa_serial.as_deref().ok_or_else(|| {
            Error::CredentialIssuance(format!(
                "profile '{}' has no mfa_serial configured",
                profile.name
            ))
        })?;

        match (&profile.role_arn, &profile.source_profile) {
            (Some(role_arn), Some(source)) => {
                let duration = clamped(requested, self.config.role_max_duration);
                info!(
                    "Assuming role '{role_arn}' via source profile '{source}' - Duration: {duration}s"
                );

                let caller = self.store.long_lived_credentials(source)?;
                let output = self
                    .client(&caller, &profile.region)
                    .await
                    .assume_role()
                    .role_arn(role_arn)
                    .role_session_name(format!("{}-session", profile.name))
                    .duration_seconds(duration as i32)
                    .serial_number(serial)
                    .token_code(otp)
                    .send()
                    .await
                    .map_err(|e| Error::CredentialIssuance(DisplayErrorContext(&e).to_string()))?;

                credential_set(output.credentials(), duration)
            }
            _ => {
                let duration = clamped(requested, self.config.user_max_duration);
                info!(
                    "Fetching session token for profile '{}' - Duration: {duration}s",
                    profile.name
                );

                let caller = self.store.long_lived_credentials(&profile.name)?;
                let output = self
                    .client(&caller, &profile.region)
                    .await
                    .get_session_token()
                    .duration_seconds(duration as i32)
                    .serial_number(serial)
                    .token_code(otp)
                    .send()
                    .await
                    .map_err(|e| Error::CredentialIssuance(DisplayErrorContext(&e).to_string()))?;

                credential_set(output.credentials(), duration)
            }
        }
    }
}

fn clamped(requested: Option<u32>, max: u32) -> u32 {
    requested.unwrap_or(max).min(max)
}

/// Converts the STS response into our credential set. The expiry is the
/// absolute instant reported by STS; if the response timestamp cannot be
/// represented, issuance time plus the accepted duration is used instead.
fn credential_set(
    credentials: Option<&types::Credentials>,
    accepted_duration: u32,
) -> Result<TemporaryCredentialSet> {
    let credentials = credentials
        .ok_or_else(|| Error::CredentialIssuance("STS returned no credentials".to_string()))?;

    let expiration = credentials.expiration();
    let expiry = DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
        .unwrap_or_else(|| Utc::now() + Duration::seconds(i64::from(accepted_duration)));

    Ok(TemporaryCredentialSet {
        access_key_id: credentials.access_key_id().to_string(),
        secret_access_key: credentials.secret_access_key().to_string(),
        session_token: credentials.session_token().to_string(),
        expiry,
    })
}
