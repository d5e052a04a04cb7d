//! Error taxonomy for the connection workflow.
//!
//! Every variant is terminal for the current invocation; nothing is retried.
//! External tool output is carried verbatim so the user can diagnose the real
//! cause (wrong MFA serial, missing 1Password item, unknown cluster) instead
//! of a generic wrapper message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("profile '{0}' is missing from the AWS config or lacks required keys")]
    ProfileNotFound(String),

    #[error("could not retrieve OTP for item '{item}': {message}")]
    OtpUnavailable { item: String, message: String },

    #[error("credential issuance failed: {0}")]
    CredentialIssuance(String),

    #[error("kubeconfig update failed for cluster '{cluster}': {message}")]
    ClusterConnect { cluster: String, message: String },

    #[error("failed to persist credentials: {0}")]
    ConfigWrite(String),
}

pub type Result<T> = std::result::Result<T, Error>;
