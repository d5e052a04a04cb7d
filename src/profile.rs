//! Profile resolution and persistence for the AWS config/credentials files.
//!
//! Two INI documents are involved, following AWS CLI conventions:
//! - `~/.aws/config`: per-profile metadata (`region`, `cluster_name`,
//!   `mfa_serial`, optional `role_arn`/`source_profile`), with sections named
//!   `profile <name>` except for `default`. The derived auth profile also
//!   carries an `expiry_timestamp` here.
//! - `~/.aws/credentials`: key material, with bare section names.
//!
//! Base profiles are user-managed and read-only to this tool. The only section
//! ever written is the derived `<base>2auth` profile, and it is written with a
//! temp-file-and-rename so a concurrent reader never observes a half-written
//! document. Concurrent invocations of the tool itself are not coordinated;
//! last writer wins.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use configparser::ini::Ini;
use log::debug;

use crate::error::{Error, Result};
use crate::issuer::TemporaryCredentialSet;

/// Suffix appended to a base profile name to form the derived auth profile.
const AUTH_SUFFIX: &str = "2auth";

/// Region used when a base profile does not set one.
const DEFAULT_REGION: &str = "ap-northeast-1";

/// A user-managed base profile loaded from the config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub region: String,
    pub cluster_name: String,
    pub mfa_serial: Option<String>,
    pub role_arn: Option<String>,
    pub source_profile: Option<String>,
}

impl Profile {
    /// A profile with a `role_arn` and a `source_profile` is refreshed via
    /// AssumeRole; anything else is a plain IAM user profile.
    pub fn is_role_based(&self) -> bool {
        self.role_arn.is_some() && self.source_profile.is_some()
    }
}

/// Whatever subset of the derived auth profile currently exists on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// `None` when the stored timestamp is absent or unparsable; both are
    /// treated as expired by the caller.
    pub expiry: Option<DateTime<Utc>>,
}

/// Long-lived key material for a base or source profile, read from the
/// credentials document.
#[derive(Debug, Clone)]
pub struct LongLivedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    config_path: PathBuf,
    credentials_path: PathBuf,
}

impl ProfileStore {
    pub fn new(config_path: PathBuf, credentials_path: PathBuf) -> Self {
        Self {
            config_path,
            credentials_path,
        }
    }

    /// Strips environment decoration (`env-dev` -> `env`) and lowercases to
    /// find the base profile name.
    pub fn base_profile_name(env_arg: &str) -> String {
        env_arg
            .split('-')
            .next()
            .unwrap_or(env_arg)
            .to_ascii_lowercase()
    }

    /// Derived auth profile name for a base profile (`env` -> `env2auth`).
    pub fn auth_profile_name(base: &str) -> String {
        format!("{base}{AUTH_SUFFIX}")
    }

    /// Loads the base profile behind an environment argument from the config
    /// document. `cluster_name` is required; `region` falls back to the
    /// default region.
    pub fn resolve_base_profile(&self, env_arg: &str) -> Result<Profile> {
        let name = Self::base_profile_name(env_arg);
        let ini = self.load_ini(&self.config_path)?;
        let section = config_section(&name);

        if !ini.sections().iter().any(|s| *s == section) {
            return Err(Error::ProfileNotFound(name));
        }
        let cluster_name = ini
            .get(&section, "cluster_name")
            .ok_or_else(|| Error::ProfileNotFound(name.clone()))?;

        Ok(Profile {
            region: ini
                .get(&section, "region")
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            cluster_name,
            mfa_serial: ini.get(&section, "mfa_serial"),
            role_arn: ini.get(&section, "role_arn"),
            source_profile: ini.get(&section, "source_profile"),
            name,
        })
    }

    /// Reads the derived auth profile's current state, or `None` if it has
    /// never been written.
    pub fn load_auth_state(&self, auth_name: &str) -> Result<Option<AuthState>> {
        let config = self.load_ini(&self.config_path)?;
        let creds = self.load_ini(&self.credentials_path)?;
        let section = config_section(auth_name);

        let in_config = config.sections().iter().any(|s| *s == section);
        let in_creds = creds.sections().iter().any(|s| s == auth_name);
        if !in_config && !in_creds {
            return Ok(None);
        }

        let expiry = config
            .get(&section, "expiry_timestamp")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(Some(AuthState {
            access_key_id: creds.get(auth_name, "aws_access_key_id"),
            secret_access_key: creds.get(auth_name, "aws_secret_access_key"),
            session_token: creds.get(auth_name, "aws_session_token"),
            expiry,
        }))
    }

    /// Writes the freshly issued credential set into the derived auth profile
    /// in both documents. All fields are written together; on any failure the
    /// prior on-disk state is left untouched.
    ///
    /// The credentials document is committed before the config document: the
    /// config document carries the `expiry_timestamp`, so a failure between
    /// the two writes leaves an expired-or-absent timestamp and the next
    /// invocation refreshes instead of trusting stale key material.
    pub fn persist_auth_state(
        &self,
        auth_name: &str,
        base: &Profile,
        creds: &TemporaryCredentialSet,
    ) -> Result<()> {
        debug!("Writing credentials to profile '{auth_name}'");

        let mut credentials = self.load_ini(&self.credentials_path)?;
        credentials.setstr(auth_name, "aws_access_key_id", Some(&creds.access_key_id));
        credentials.setstr(
            auth_name,
            "aws_secret_access_key",
            Some(&creds.secret_access_key),
        );
        credentials.setstr(auth_name, "aws_session_token", Some(&creds.session_token));

        let mut config = self.load_ini(&self.config_path)?;
        let section = config_section(auth_name);
        config.setstr(&section, "region", Some(&base.region));
        config.setstr(&section, "output", Some("json"));
        config.setstr(
            &section,
            "expiry_timestamp",
            Some(&creds.expiry.to_rfc3339()),
        );

        write_atomic(&self.credentials_path, &credentials.writes())?;
        write_atomic(&self.config_path, &config.writes())?;
        Ok(())
    }

    /// Long-lived key material for a named profile, used as the STS caller
    /// identity when issuing temporary credentials.
    pub fn long_lived_credentials(&self, profile: &str) -> Result<LongLivedCredentials> {
        let ini = self.load_ini(&self.credentials_path)?;
        let get = |key: &str| {
            ini.get(profile, key)
                .ok_or_else(|| Error::ProfileNotFound(profile.to_string()))
        };
        Ok(LongLivedCredentials {
            access_key_id: get("aws_access_key_id")?,
            secret_access_key: get("aws_secret_access_key")?,
            session_token: ini.get(profile, "aws_session_token"),
        })
    }

    // A missing document is an empty one; only a present-but-unreadable file
    // is an error.
    fn load_ini(&self, path: &Path) -> Result<Ini> {
        let mut ini = Ini::new();
        if path.exists() {
            ini.load(path)
                .map_err(|e| Error::ConfigWrite(format!("{}: {e}", path.display())))?;
        }
        Ok(ini)
    }
}

/// Config-document section name for a profile; `default` is stored bare, any
/// other profile under `profile <name>`.
fn config_section(profile: &str) -> String {
    if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

/// Write-to-temp-then-rename within the target directory, so readers see
/// either the old document or the new one, never a partial write.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let map_err = |e: std::io::Error| Error::ConfigWrite(format!("{}: {e}", path.display()));

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(map_err)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let tmp = dir.join(format!(".{file_name}.tmp"));

    fs::write(&tmp, contents).map_err(map_err)?;
    fs::rename(&tmp, path).map_err(map_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ProfileStore {
        ProfileStore::new(dir.path().join("config"), dir.path().join("credentials"))
    }

    fn write_config(dir: &TempDir, contents: &str) {
        fs::write(dir.path().join("config"), contents).unwrap();
    }

    fn write_credentials(dir: &TempDir, contents: &str) {
        fs::write(dir.path().join("credentials"), contents).unwrap();
    }

    fn sample_credentials(expiry: DateTime<Utc>) -> TemporaryCredentialSet {
        TemporaryCredentialSet {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiry,
        }
    }

    #[test]
    fn base_profile_name_strips_decoration_and_lowercases() {
        assert_eq!(ProfileStore::base_profile_name("Env-dev"), "env");
        assert_eq!(ProfileStore::base_profile_name("shared"), "shared");
        assert_eq!(ProfileStore::base_profile_name("prod-eu-west-1"), "prod");
    }

    #[test]
    fn auth_profile_name_appends_suffix() {
        assert_eq!(ProfileStore::auth_profile_name("env"), "env2auth");
    }

    #[test]
    fn resolves_role_based_profile() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "[profile env]\n\
             region=eu-west-2\n\
             cluster_name=env-cluster\n\
             mfa_serial=arn:aws:iam::123456789012:mfa/env\n\
             role_arn=arn:aws:iam::123456789012:role/admin\n\
             source_profile=shared\n",
        );

        let profile = store_in(&dir).resolve_base_profile("env-dev").unwrap();
        assert_eq!(profile.name, "env");
        assert_eq!(profile.region, "eu-west-2");
        assert_eq!(profile.cluster_name, "env-cluster");
        assert!(profile.is_role_based());
        assert_eq!(profile.source_profile.as_deref(), Some("shared"));
    }

    #[test]
    fn region_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "[profile shared]\n\
             cluster_name=shared-cluster\n\
             mfa_serial=arn:aws:iam::123456789012:mfa/shared\n",
        );

        let profile = store_in(&dir).resolve_base_profile("shared").unwrap();
        assert_eq!(profile.region, DEFAULT_REGION);
        assert!(!profile.is_role_based());
    }

    #[test]
    fn missing_profile_is_profile_not_found() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile other]\ncluster_name=c\n");

        let err = store_in(&dir).resolve_base_profile("env").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(name) if name == "env"));
    }

    #[test]
    fn missing_cluster_name_is_profile_not_found() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile env]\nregion=eu-west-2\n");

        let err = store_in(&dir).resolve_base_profile("env").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(_)));
    }

    #[test]
    fn absent_auth_profile_loads_as_none() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile env]\ncluster_name=c\n");

        let state = store_in(&dir).load_auth_state("env2auth").unwrap();
        assert!(state.is_none());
    }

    #[test]
    fn unparsable_expiry_loads_as_no_expiry() {
        let dir = TempDir::new().unwrap();
        write_config(
            &dir,
            "[profile env2auth]\nregion=eu-west-2\nexpiry_timestamp=not-a-timestamp\n",
        );

        let state = store_in(&dir).load_auth_state("env2auth").unwrap().unwrap();
        assert_eq!(state.expiry, None);
    }

    #[test]
    fn persist_then_load_round_trips_all_fields() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile env]\nregion=eu-west-2\ncluster_name=c\n");
        let store = store_in(&dir);
        let base = store.resolve_base_profile("env").unwrap();

        let expiry = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        let creds = sample_credentials(expiry);
        store.persist_auth_state("env2auth", &base, &creds).unwrap();

        let state = store.load_auth_state("env2auth").unwrap().unwrap();
        assert_eq!(state.access_key_id.as_deref(), Some("ASIAEXAMPLE"));
        assert_eq!(state.secret_access_key.as_deref(), Some("secret"));
        assert_eq!(state.session_token.as_deref(), Some("token"));
        assert_eq!(state.expiry, Some(expiry));
    }

    #[test]
    fn persist_preserves_existing_sections() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile env]\nregion=eu-west-2\ncluster_name=c\n");
        write_credentials(
            &dir,
            "[env]\naws_access_key_id=AKIALONGTERM\naws_secret_access_key=longsecret\n",
        );
        let store = store_in(&dir);
        let base = store.resolve_base_profile("env").unwrap();

        let creds = sample_credentials(Utc::now());
        store.persist_auth_state("env2auth", &base, &creds).unwrap();

        let long_lived = store.long_lived_credentials("env").unwrap();
        assert_eq!(long_lived.access_key_id, "AKIALONGTERM");
        assert_eq!(long_lived.secret_access_key, "longsecret");
        assert!(long_lived.session_token.is_none());

        let base_again = store.resolve_base_profile("env").unwrap();
        assert_eq!(base_again.cluster_name, "c");
    }

    #[test]
    fn overwriting_auth_profile_replaces_previous_credentials() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile env]\nregion=eu-west-2\ncluster_name=c\n");
        let store = store_in(&dir);
        let base = store.resolve_base_profile("env").unwrap();

        store
            .persist_auth_state("env2auth", &base, &sample_credentials(Utc::now()))
            .unwrap();
        let newer = TemporaryCredentialSet {
            access_key_id: "ASIANEWER".to_string(),
            secret_access_key: "newer-secret".to_string(),
            session_token: "newer-token".to_string(),
            expiry: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
        };
        store.persist_auth_state("env2auth", &base, &newer).unwrap();

        let state = store.load_auth_state("env2auth").unwrap().unwrap();
        assert_eq!(state.access_key_id.as_deref(), Some("ASIANEWER"));
        assert_eq!(state.expiry, Some(newer.expiry));
    }

    #[test]
    fn failed_credentials_write_leaves_expiry_untouched() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "[profile env]\nregion=eu-west-2\ncluster_name=c\n");
        // A regular file where the credentials document's directory should
        // be makes that write fail while the config document stays writable.
        fs::write(dir.path().join("blocker"), "not a directory").unwrap();
        let store = ProfileStore::new(
            dir.path().join("config"),
            dir.path().join("blocker").join("credentials"),
        );
        let base = store.resolve_base_profile("env").unwrap();

        let future = Utc::now() + Duration::days(30);
        let err = store
            .persist_auth_state("env2auth", &base, &sample_credentials(future))
            .unwrap_err();
        assert!(matches!(err, Error::ConfigWrite(_)));

        // No expiry may reach the config document when the key material was
        // never written; the derived profile must stay absent.
        let config = fs::read_to_string(dir.path().join("config")).unwrap();
        assert!(!config.contains("expiry_timestamp"));
        assert!(store.load_auth_state("env2auth").unwrap().is_none());
    }

    #[test]
    fn missing_long_lived_credentials_is_profile_not_found() {
        let dir = TempDir::new().unwrap();
        let err = store_in(&dir).long_lived_credentials("shared").unwrap_err();
        assert!(matches!(err, Error::ProfileNotFound(name) if name == "shared"));
    }
}
