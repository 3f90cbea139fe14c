//! Configuration management for the TruckTech scraper.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Every section falls back to defaults
//! that match the live PACCAR Solutions portal.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/trucktech/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Portal endpoints and URL markers
    pub portal: PortalConfig,
    /// Browser launch settings
    pub browser: BrowserConfig,
    /// Login and session reuse settings
    pub auth: AuthConfig,
    /// Page extraction settings
    pub extraction: ExtractionConfig,
    /// CSS selectors for every page the scraper touches
    pub selectors: SelectorConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, falling back to defaults
    /// when the file does not exist.
    pub fn load_from(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `TRUCKTECH_HEADLESS` (or legacy `HEADLESS`): browser headless mode (true/false)
    /// - `TRUCKTECH_BASE_URL`: portal base URL
    /// - `TRUCKTECH_SESSION_FILE`: where the browser session is persisted
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    ///
    /// Takes a lookup function instead of reading the process environment
    /// directly so overrides can be exercised without mutating global state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let headless = lookup("TRUCKTECH_HEADLESS").or_else(|| lookup("HEADLESS"));
        if let Some(val) = headless {
            if let Ok(headless) = val.to_lowercase().parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("TRUCKTECH_BASE_URL") {
            if !val.is_empty() {
                tracing::debug!("Override portal.base_url from env: {}", val);
                self.portal.base_url = val;
            }
        }

        if let Some(val) = lookup("TRUCKTECH_SESSION_FILE") {
            if !val.is_empty() {
                tracing::debug!("Override auth.session_file from env: {}", val);
                self.auth.session_file = PathBuf::from(val);
            }
        }
    }

    /// Check values that would otherwise fail much later at runtime.
    pub fn validate(&self) -> ConfigResult<()> {
        let base = &self.portal.base_url;
        if !(base.starts_with("https://") || base.starts_with("http://")) {
            return Err(ConfigError::InvalidValue {
                field: "portal.base_url".to_string(),
                reason: format!("must be an http(s) URL, got '{base}'"),
            });
        }

        if self.portal.login_marker.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "portal.login_marker".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }

        if self.extraction.page_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "extraction.page_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.extraction.description_max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "extraction.description_max_chars".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `config_path`, creating its directory if needed.
    pub fn save_to(&self, config_path: &Path) -> ConfigResult<()> {
        if let Some(config_dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(config_dir)?;
        }
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/trucktech/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("net", "trucktech", "trucktech").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Portal endpoints and the URL fragments used to classify where the
/// browser ended up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Portal origin, without trailing slash
    pub base_url: String,
    /// Path of the login form
    pub login_path: String,
    /// Authenticated-only page used to probe a restored session
    pub dashboard_path: String,
    /// Asset (vehicle) listing page
    pub assets_path: String,
    /// URL fragment that means "we are on the login page"
    pub login_marker: String,
    /// URL fragments that mean "we are inside the authenticated area"
    pub authenticated_markers: Vec<String>,
}

impl PortalConfig {
    fn join(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Full login URL.
    #[must_use]
    pub fn login_url(&self) -> String {
        self.join(&self.login_path)
    }

    /// Full dashboard URL.
    #[must_use]
    pub fn dashboard_url(&self) -> String {
        self.join(&self.dashboard_path)
    }

    /// Full asset listing URL.
    #[must_use]
    pub fn assets_url(&self) -> String {
        self.join(&self.assets_path)
    }

    /// Per-vehicle diagnostics URL.
    #[must_use]
    pub fn diagnostics_url(&self, vin: &str) -> String {
        format!("{}/{vin}/diagnostics", self.assets_url())
    }

    /// Whether `url` is the login page.
    #[must_use]
    pub fn is_login_url(&self, url: &str) -> bool {
        url.contains(&self.login_marker)
    }

    /// Whether `url` is a known page of the authenticated area.
    #[must_use]
    pub fn is_authenticated_url(&self, url: &str) -> bool {
        self.authenticated_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()))
    }
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "https://paccar.decisiv.net".to_string(),
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            assets_path: "/assets".to_string(),
            login_marker: "/login".to_string(),
            authenticated_markers: vec!["/dashboard".to_string(), "/home".to_string()],
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent for fresh contexts; `None` keeps Chromium's own
    pub user_agent: Option<String>,
    /// Pick a random desktop user agent and viewport for each fresh context
    pub randomize_fingerprint: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: Some(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            randomize_fingerprint: false,
        }
    }
}

/// Login and session reuse settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// File the browser session (cookies + storage) is persisted to
    pub session_file: PathBuf,
    /// Settle timeout when probing a restored session
    pub session_probe_timeout_secs: u64,
    /// Settle timeout for the login page itself
    pub login_page_timeout_secs: u64,
    /// Settle timeout after submitting credentials
    pub login_settle_timeout_secs: u64,
    /// How long to wait for the dashboard after submitting a TOTP code
    pub mfa_timeout_secs: u64,
    /// How long a human gets to finish MFA in a visible browser
    pub interactive_mfa_timeout_secs: u64,
}

impl AuthConfig {
    /// Session probe timeout as a `Duration`.
    #[must_use]
    pub fn session_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.session_probe_timeout_secs)
    }

    /// Login page settle timeout as a `Duration`.
    #[must_use]
    pub fn login_page_timeout(&self) -> Duration {
        Duration::from_secs(self.login_page_timeout_secs)
    }

    /// Post-submit settle timeout as a `Duration`.
    #[must_use]
    pub fn login_settle_timeout(&self) -> Duration {
        Duration::from_secs(self.login_settle_timeout_secs)
    }

    /// TOTP confirmation timeout as a `Duration`.
    #[must_use]
    pub fn mfa_timeout(&self) -> Duration {
        Duration::from_secs(self.mfa_timeout_secs)
    }

    /// Interactive MFA timeout as a `Duration`.
    #[must_use]
    pub fn interactive_mfa_timeout(&self) -> Duration {
        Duration::from_secs(self.interactive_mfa_timeout_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_file: PathBuf::from("session_storage.json"),
            session_probe_timeout_secs: 10,
            login_page_timeout_secs: 30,
            login_settle_timeout_secs: 15,
            mfa_timeout_secs: 10,
            interactive_mfa_timeout_secs: 300,
        }
    }
}

/// Page extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// How long to wait for roster/diagnostics structure to appear
    pub page_timeout_secs: u64,
    /// Fault descriptions are cut to this many characters
    pub description_max_chars: usize,
}

impl ExtractionConfig {
    /// Page structure timeout as a `Duration`.
    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            page_timeout_secs: 30,
            description_max_chars: 500,
        }
    }
}

/// CSS selectors for the login form, MFA prompt, roster and diagnostics pages.
///
/// Single strings may be comma-separated selector groups. List fields are
/// alternates tried in order, first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Username input on the login form
    pub login_username: String,
    /// Password input on the login form
    pub login_password: String,
    /// Login form submit button
    pub login_submit: String,
    /// Error banner shown after a rejected login
    pub login_error: String,
    /// One-time code input on the MFA prompt
    pub mfa_code_input: String,
    /// MFA prompt submit button
    pub mfa_submit: String,
    /// Any of these means the roster page has rendered
    pub roster_ready: Vec<String>,
    /// Roster table rows
    pub roster_rows: String,
    /// Cells within a roster table row
    pub roster_cells: String,
    /// Roster cards, for the list layout
    pub roster_cards: String,
    /// VIN within a card
    pub card_vin: Vec<String>,
    /// Unit number within a card
    pub card_unit_number: Vec<String>,
    /// Combined year/make/model within a card
    pub card_year_make_model: Vec<String>,
    /// Status within a card
    pub card_status: Vec<String>,
    /// Any of these means the diagnostics page has rendered
    pub faults_ready: Vec<String>,
    /// Explicit "no faults" marker
    pub no_faults: String,
    /// Fault rows or items
    pub fault_rows: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let list = |items: &[&str]| -> Vec<String> {
            items.iter().map(ToString::to_string).collect()
        };
        Self {
            login_username: "#auth_key".to_string(),
            login_password: r#"input[type="password"]"#.to_string(),
            login_submit: r#"button[type="submit"]"#.to_string(),
            login_error: ".error, .alert-danger, .error-message".to_string(),
            mfa_code_input: r#"input[name="code"], input[placeholder*="code"]"#.to_string(),
            mfa_submit: r#"button[type="submit"]"#.to_string(),
            roster_ready: list(&["table tbody tr", ".asset-list", ".vehicle-list", ".no-data"]),
            roster_rows: "table tbody tr".to_string(),
            roster_cells: "td".to_string(),
            roster_cards: ".asset-card, .vehicle-card".to_string(),
            card_vin: list(&[".vin", "[data-vin]"]),
            card_unit_number: list(&[".unit-number", ".unit"]),
            card_year_make_model: list(&[".year-make-model", ".vehicle-info"]),
            card_status: list(&[".status"]),
            faults_ready: list(&[".fault-list", ".dtc-table", "table", ".no-faults", ".no-data"]),
            no_faults: ".no-faults, .no-data".to_string(),
            fault_rows: ".fault-row, .dtc-row, table tbody tr, .fault-item".to_string(),
        }
    }
}
