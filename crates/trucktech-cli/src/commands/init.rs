//! `trucktech init`

use anyhow::Context;
use std::path::Path;
use trucktech_core::credentials::CREDENTIALS_FILE;
use trucktech_core::{AppConfig, Credentials};

/// Credentials to store alongside the config.
#[derive(Debug, Default)]
pub struct NewCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp_secret: Option<String>,
}

/// Write a default config file and, if given, a credentials file.
pub fn run(
    config_path: &Path,
    credentials_path: &Path,
    force: bool,
    new: NewCredentials,
) -> anyhow::Result<bool> {
    if config_path.exists() && !force {
        println!(
            "Config already exists at {} (use --force to overwrite)",
            config_path.display()
        );
    } else {
        AppConfig::default()
            .save_to(config_path)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        println!("Wrote default config to {}", config_path.display());
    }

    if let (Some(username), Some(password)) = (new.username, new.password) {
        Credentials::new(username, password, new.totp_secret)
            .save_to_file(credentials_path)
            .with_context(|| format!("failed to write {}", credentials_path.display()))?;
        println!("Saved credentials to {}", credentials_path.display());
    }
    Ok(true)
}

/// Config path for `init`: the explicit one or the default location.
pub fn config_path(explicit: Option<&Path>) -> anyhow::Result<std::path::PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(AppConfig::config_path()?),
    }
}

/// The credentials file looked up by the other commands.
pub fn credentials_path() -> &'static Path {
    Path::new(CREDENTIALS_FILE)
}
