//! `trucktech status`

use super::resolve_credentials;
use crate::LoginArgs;
use chrono::{DateTime, Local, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use trucktech_browser::{FileSessionStore, SessionStore};
use trucktech_core::{AppConfig, ConfigError};

/// What is known about the stored session file.
#[derive(Debug)]
pub struct SessionFileStatus {
    pub path: PathBuf,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Local>>,
    pub cookies: Result<usize, String>,
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionFileStatus {
    /// Inspect `path` without touching it.
    pub async fn inspect(path: &Path) -> Self {
        let metadata = tokio::fs::metadata(path).await.ok();
        let size = metadata.as_ref().map(std::fs::Metadata::len);
        let modified = metadata
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Local>::from);

        let (cookies, saved_at) = match FileSessionStore.load(path).await {
            Ok(Some(state)) => (Ok(state.cookies.len()), state.saved_at),
            Ok(None) => (Ok(0), None),
            Err(e) => (Err(e.to_string()), None),
        };

        Self {
            path: path.to_path_buf(),
            size,
            modified,
            cookies,
            saved_at,
        }
    }

    /// Whether the file exists at all.
    pub fn exists(&self) -> bool {
        self.size.is_some()
    }
}

impl fmt::Display for SessionFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.exists() {
            return write!(f, "Session: none ({})", self.path.display());
        }

        writeln!(f, "Session: {}", self.path.display())?;
        if let Some(modified) = self.modified {
            writeln!(f, "  Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"))?;
        }
        writeln!(f, "  Size: {} bytes", self.size.unwrap_or_default())?;
        if let Some(saved_at) = self.saved_at {
            writeln!(f, "  Saved at: {}", saved_at.to_rfc3339())?;
        }
        match &self.cookies {
            Ok(count) => write!(f, "  Cookies: {count}"),
            Err(e) => write!(f, "  Unreadable: {e}"),
        }
    }
}

fn credentials_line() -> String {
    match resolve_credentials(&LoginArgs::default()) {
        Ok(creds) => {
            let mfa = if creds.totp_secret().is_some() {
                ", TOTP configured"
            } else {
                ""
            };
            format!("Credentials: configured for {}{mfa}", creds.username)
        }
        Err(e) => match e.downcast_ref::<ConfigError>() {
            Some(ConfigError::MissingCredentials { .. }) => "Credentials: not configured".to_string(),
            _ => format!("Credentials: invalid ({e})"),
        },
    }
}

/// Print session and credential status. Always succeeds.
pub async fn run(config: &AppConfig) -> anyhow::Result<bool> {
    println!("Portal: {}", config.portal.base_url);
    println!("{}", SessionFileStatus::inspect(&config.auth.session_file).await);
    println!("{}", credentials_line());
    Ok(true)
}
