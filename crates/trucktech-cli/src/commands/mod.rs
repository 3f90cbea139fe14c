//! Command implementations.

pub mod init;
pub mod login;
pub mod status;
pub mod sync;

use crate::LoginArgs;
use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use trucktech_auth::{Authenticator, StaticCodeProvider};
use trucktech_browser::{BrowserEngine, FileSessionStore};
use trucktech_core::credentials::CREDENTIALS_FILE;
use trucktech_core::{AppConfig, Credentials};

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Load the config file (explicit or default) and apply env overrides.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                bail!("config file {} does not exist", path.display());
            }
            AppConfig::load_from(path)?
        }
        None => AppConfig::load()?,
    };
    config.apply_env_overrides(env_lookup);
    config.validate()?;
    Ok(config)
}

/// Credentials from the command line, else the environment, else the credentials file.
pub fn resolve_credentials(login: &LoginArgs) -> anyhow::Result<Credentials> {
    if let (Some(username), Some(password)) = (&login.username, &login.password) {
        return Ok(Credentials::new(
            username.as_str(),
            password.as_str(),
            env_lookup("TRUCKTECH_TOTP_SECRET"),
        ));
    }
    Ok(Credentials::resolve(env_lookup, Path::new(CREDENTIALS_FILE))?)
}

/// Launch Chromium and wire up an authenticator for `login`.
pub async fn build_authenticator(
    config: &AppConfig,
    login: &LoginArgs,
) -> anyhow::Result<Authenticator> {
    let credentials = resolve_credentials(login)?;
    let engine = BrowserEngine::launch(&config.browser)
        .await
        .context("failed to launch Chromium")?;

    let mut authenticator = Authenticator::new(
        config,
        credentials,
        Arc::new(engine),
        Arc::new(FileSessionStore),
    )?;
    if let Some(code) = &login.mfa_code {
        authenticator = authenticator.with_mfa_provider(Arc::new(StaticCodeProvider::new(code)));
    }
    Ok(authenticator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_credentials_win() {
        let login = LoginArgs {
            username: Some("cli-user".to_string()),
            password: Some("cli-pass".to_string()),
            mfa_code: None,
        };
        let creds = resolve_credentials(&login).unwrap();
        assert_eq!(creds.username, "cli-user");
        assert_eq!(creds.password(), "cli-pass");
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[extraction]\npage_timeout_secs = 5\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.extraction.page_timeout_secs, 5);
    }
}
