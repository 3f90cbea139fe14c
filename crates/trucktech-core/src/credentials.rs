//! Portal credentials.
//!
//! Credentials are looked up from the environment first and then from a
//! JSON file next to the working directory. Secrets are zeroized on drop
//! and never printed through `Debug`.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

/// Default credentials file name.
pub const CREDENTIALS_FILE: &str = ".trucktech_credentials.json";

/// Username, password and optional TOTP secret for the portal.
#[derive(Clone)]
pub struct Credentials {
    /// Portal username
    pub username: String,
    password: Zeroizing<String>,
    totp_secret: Option<Zeroizing<String>>,
}

#[derive(Serialize, Deserialize)]
struct CredentialsFile {
    username: Option<String>,
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    totp_secret: Option<String>,
}

impl Credentials {
    /// Build credentials from explicit values.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        totp_secret: Option<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
            totp_secret: totp_secret
                .filter(|s| !s.trim().is_empty())
                .map(Zeroizing::new),
        }
    }

    /// The portal password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// The base32 TOTP secret, if MFA automation is configured.
    #[must_use]
    pub fn totp_secret(&self) -> Option<&str> {
        self.totp_secret.as_ref().map(|s| s.as_str())
    }

    /// Read `TRUCKTECH_USERNAME`, `TRUCKTECH_PASSWORD` and the optional
    /// `TRUCKTECH_TOTP_SECRET` through `lookup`.
    ///
    /// Returns `None` unless both username and password are non-empty.
    pub fn from_env<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup("TRUCKTECH_USERNAME").filter(|s| !s.is_empty())?;
        let password = lookup("TRUCKTECH_PASSWORD").filter(|s| !s.is_empty())?;
        Some(Self::new(username, password, lookup("TRUCKTECH_TOTP_SECRET")))
    }

    /// Read credentials from a JSON file.
    ///
    /// Returns `Ok(None)` when the file is absent or lacks a username or
    /// password.
    pub fn from_file(path: &Path) -> ConfigResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)?;
        let file: CredentialsFile =
            serde_json::from_str(&contents).map_err(|source| ConfigError::CredentialsFile {
                path: path.display().to_string(),
                source,
            })?;

        match (file.username, file.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Some(Self::new(username, password, file.totp_secret)))
            }
            _ => Ok(None),
        }
    }

    /// Resolve credentials: environment first, then `file`.
    pub fn resolve<F>(lookup: F, file: &Path) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(creds) = Self::from_env(lookup) {
            tracing::debug!("Using credentials from environment");
            return Ok(creds);
        }

        if let Some(creds) = Self::from_file(file)? {
            tracing::debug!("Using credentials from {}", file.display());
            return Ok(creds);
        }

        Err(ConfigError::MissingCredentials {
            file: file.display().to_string(),
        })
    }

    /// Write credentials to `path` as JSON, owner-readable only on unix.
    pub fn save_to_file(&self, path: &Path) -> ConfigResult<()> {
        let file = CredentialsFile {
            username: Some(self.username.clone()),
            password: Some(self.password.to_string()),
            totp_secret: self.totp_secret().map(ToString::to_string),
        };
        let contents = Zeroizing::new(serde_json::to_string_pretty(&file).map_err(|source| {
            ConfigError::CredentialsFile {
                path: path.display().to_string(),
                source,
            }
        })?);
        fs::write(path, contents.as_bytes())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("has_password", &!self.password.is_empty())
            .field("has_totp", &self.totp_secret.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&'static str, &'static str)]) -> HashMap<&'static str, String> {
        pairs.iter().map(|(k, v)| (*k, (*v).to_string())).collect()
    }

    #[test]
    fn test_from_env() {
        let vars = env(&[
            ("TRUCKTECH_USERNAME", "dispatch@fleet.example"),
            ("TRUCKTECH_PASSWORD", "hunter2"),
            ("TRUCKTECH_TOTP_SECRET", "JBSWY3DPEHPK3PXP"),
        ]);
        let creds = Credentials::from_env(|k| vars.get(k).cloned()).expect("credentials");
        assert_eq!(creds.username, "dispatch@fleet.example");
        assert_eq!(creds.password(), "hunter2");
        assert_eq!(creds.totp_secret(), Some("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn test_from_env_requires_password() {
        let vars = env(&[("TRUCKTECH_USERNAME", "dispatch@fleet.example")]);
        assert!(Credentials::from_env(|k| vars.get(k).cloned()).is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::new("user", "s3cret-pass", Some("JBSWY3DP".to_string()));
        let debug = format!("{creds:?}");
        assert!(!debug.contains("s3cret-pass"));
        assert!(!debug.contains("JBSWY3DP"));
        assert!(debug.contains("has_totp: true"));
    }

    #[test]
    fn test_blank_totp_is_none() {
        let creds = Credentials::new("user", "pass", Some("  ".to_string()));
        assert!(creds.totp_secret().is_none());
    }

    #[test]
    fn test_file_round_trip_and_resolve_order() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join(CREDENTIALS_FILE);

        Credentials::new("file-user", "file-pass", None)
            .save_to_file(&path)
            .expect("save credentials");

        let from_file = Credentials::resolve(|_| None, &path).expect("resolve from file");
        assert_eq!(from_file.username, "file-user");
        assert!(from_file.totp_secret().is_none());

        let vars = env(&[
            ("TRUCKTECH_USERNAME", "env-user"),
            ("TRUCKTECH_PASSWORD", "env-pass"),
        ]);
        let from_env = Credentials::resolve(|k| vars.get(k).cloned(), &path).expect("resolve");
        assert_eq!(from_env.username, "env-user");
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join(CREDENTIALS_FILE);
        Credentials::new("u", "p", None)
            .save_to_file(&path)
            .expect("save credentials");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_missing_everywhere() {
        let tmp = TempDir::new().expect("create temp dir");
        let err = Credentials::resolve(|_| None, &tmp.path().join("none.json"))
            .expect_err("should be missing");
        assert!(matches!(err, ConfigError::MissingCredentials { .. }));
    }

    #[test]
    fn test_corrupt_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join(CREDENTIALS_FILE);
        fs::write(&path, "{not json").expect("write file");
        let err = Credentials::from_file(&path).expect_err("should fail");
        assert!(matches!(err, ConfigError::CredentialsFile { .. }));
    }
}
