//! One-time passcode retrieval via the 1Password CLI.

use std::process::Command;

use log::info;

use crate::error::{Error, Result};
use crate::profile::Profile;

/// 1Password item prefix; the item for profile `env` is named `AmazonENV`.
const ITEM_PREFIX: &str = "Amazon";

/// Source of TOTP codes for STS calls. Injected so tests can substitute a
/// deterministic fake.
pub trait OtpProvider {
    fn fetch_otp(&self, item_name: &str) -> Result<String>;
}

/// 1Password item name holding the TOTP for a base profile.
pub fn otp_item_name(profile: &Profile) -> String {
    format!("{ITEM_PREFIX}{}", profile.name.to_ascii_uppercase())
}

/// Fetches codes with `op item get <item> --otp`. Requires a signed-in
/// 1Password CLI session.
pub struct OnePassword;

impl OtpProvider for OnePassword {
    fn fetch_otp(&self, item_name: &str) -> Result<String> {
        let unavailable = |message: String| Error::OtpUnavailable {
            item: item_name.to_string(),
            message,
        };

        let output = Command::new("op")
            .args(["item", "get", item_name, "--otp"])
            .output()
            .map_err(|e| unavailable(e.to_string()))?;

        if !output.status.success() {
            return Err(unavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let otp = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !is_valid_otp(&otp) {
            return Err(unavailable(format!("expected a 6-digit code, got '{otp}'")));
        }

        info!("Retrieved MFA token from 1Password item '{item_name}'");
        Ok(otp)
    }
}

fn is_valid_otp(otp: &str) -> bool {
    otp.len() == 6 && otp.chars().all(|c| c.is_ascii_digit())
}
