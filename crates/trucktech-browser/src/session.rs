//! Persisted browser session state.
//!
//! A [`SessionState`] is the cookies plus per-origin local storage of an
//! authenticated context. It is opaque to the scraper core: the
//! authenticator only asks a [`SessionStore`] to load or save it.

use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A single browser cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiry in seconds since the Unix epoch; `None` for session cookies
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// Whether the cookie has expired at `now` (seconds since epoch).
    #[must_use]
    pub fn is_expired_at(&self, now: f64) -> bool {
        self.expires.is_some_and(|expires| expires > 0.0 && expires <= now)
    }
}

/// Local storage entries for one origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginStorage {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<(String, String)>,
}

/// Cookies and storage of a browsing context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginStorage>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Whether there is nothing to restore.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    /// Look up a cookie by name.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&StoredCookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// Cookies still valid at `now`.
    pub fn live_cookies(&self, now: DateTime<Utc>) -> impl Iterator<Item = &StoredCookie> {
        #[allow(clippy::cast_precision_loss)]
        let now = now.timestamp() as f64;
        self.cookies.iter().filter(move |c| !c.is_expired_at(now))
    }
}

/// Persistence for session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the state stored at `path`, `None` when nothing is stored.
    async fn load(&self, path: &Path) -> Result<Option<SessionState>>;

    /// Store `state` at `path`, replacing what was there.
    async fn save(&self, path: &Path, state: &SessionState) -> Result<()>;
}

/// Stores session state as pretty-printed JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSessionStore;

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, path: &Path) -> Result<Option<SessionState>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let state: SessionState = serde_json::from_str(&contents)?;
        if state.is_empty() {
            tracing::debug!("Session file {} holds no cookies", path.display());
            return Ok(None);
        }
        Ok(Some(state))
    }

    async fn save(&self, path: &Path, state: &SessionState) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut state = state.clone();
        state.saved_at = Some(Utc::now());
        let contents = serde_json::to_string_pretty(&state)?;

        // Write then rename so a crash never leaves a half-written session.
        let file_name = path
            .file_name()
            .ok_or_else(|| BrowserError::Session(format!("not a file path: {}", path.display())))?;
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, contents).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600)).await?;
        }
        tokio::fs::rename(&tmp_path, path).await?;

        tracing::debug!("Session saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cookie(name: &str, expires: Option<f64>) -> StoredCookie {
        StoredCookie {
            name: name.to_string(),
            value: "abc123".to_string(),
            domain: "paccar.decisiv.net".to_string(),
            path: "/".to_string(),
            expires,
            http_only: true,
            secure: true,
        }
    }

    #[test]
    fn test_expiry() {
        assert!(!cookie("sid", None).is_expired_at(1_000.0));
        assert!(cookie("sid", Some(999.0)).is_expired_at(1_000.0));
        assert!(!cookie("sid", Some(1_001.0)).is_expired_at(1_000.0));
    }

    #[test]
    fn test_live_cookies_skip_expired() {
        let state = SessionState {
            cookies: vec![cookie("old", Some(1.0)), cookie("sid", None)],
            ..SessionState::default()
        };
        let live: Vec<_> = state.live_cookies(Utc::now()).map(|c| c.name.as_str()).collect();
        assert_eq!(live, vec!["sid"]);
    }

    #[test]
    fn test_deserialize_minimal_cookie() {
        let json = r#"{"cookies":[{"name":"sid","value":"v","domain":"example.com"}]}"#;
        let state: SessionState = serde_json::from_str(json).expect("parse");
        let sid = state.cookie("sid").expect("sid cookie");
        assert_eq!(sid.path, "/");
        assert!(sid.expires.is_none());
        assert!(state.origins.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("nested").join("session.json");
        let store = FileSessionStore;

        assert!(store.load(&path).await.expect("load missing").is_none());

        let state = SessionState {
            cookies: vec![cookie("_decisiv_session", None)],
            origins: vec![OriginStorage {
                origin: "https://paccar.decisiv.net".to_string(),
                local_storage: vec![("locale".to_string(), "en-US".to_string())],
            }],
            saved_at: None,
        };
        store.save(&path, &state).await.expect("save");

        let loaded = store.load(&path).await.expect("load").expect("state present");
        assert_eq!(loaded.cookies, state.cookies);
        assert_eq!(loaded.origins, state.origins);
        assert!(loaded.saved_at.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("session.json");
        tokio::fs::write(&path, "{ truncated").await.expect("write");

        let err = FileSessionStore.load(&path).await.expect_err("corrupt");
        assert!(matches!(err, BrowserError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_empty_state_loads_as_none() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("session.json");
        tokio::fs::write(&path, "{}").await.expect("write");

        assert!(FileSessionStore.load(&path).await.expect("load").is_none());
    }
}
