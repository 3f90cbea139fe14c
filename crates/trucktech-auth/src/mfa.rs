//! Second-factor detection and code generation.

use crate::error::{AuthError, Result};
use async_trait::async_trait;
use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use trucktech_browser::PageDriver;
use zeroize::Zeroizing;

type HmacSha1 = Hmac<Sha1>;

/// Kind of second-factor challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MfaKind {
    /// Authenticator app code
    Totp,
    /// Code sent by text message
    Sms,
    /// Code sent by e-mail
    Email,
}

impl fmt::Display for MfaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Totp => "totp",
            Self::Sms => "sms",
            Self::Email => "email",
        })
    }
}

/// Something on the page that gives a challenge away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MfaIndicator {
    /// An element matching a CSS selector
    Selector(&'static str),
    /// An element whose whole text is exactly this
    Text(&'static str),
}

impl MfaIndicator {
    /// Whether the indicator is present. Query errors count as absent.
    pub async fn is_present(&self, page: &dyn PageDriver) -> bool {
        let found = match self {
            Self::Selector(selector) => page.query_selector(selector).await.map(|e| e.is_some()),
            Self::Text(text) => page.has_exact_text(text).await,
        };
        found.unwrap_or_else(|e| {
            tracing::trace!("MFA indicator {:?} check failed: {}", self, e);
            false
        })
    }
}

/// Detectors in priority order.
pub const MFA_DETECTORS: &[(MfaKind, &[MfaIndicator])] = &[
    (
        MfaKind::Totp,
        &[
            MfaIndicator::Selector(r#"input[name="code"]"#),
            MfaIndicator::Selector(r#"input[placeholder*="authenticator"]"#),
        ],
    ),
    (
        MfaKind::Sms,
        &[MfaIndicator::Text("text message"), MfaIndicator::Text("SMS")],
    ),
    (
        MfaKind::Email,
        &[
            MfaIndicator::Text("email"),
            MfaIndicator::Text("verification code"),
        ],
    ),
];

/// Detect a second-factor challenge on `page`. The first matching detector wins.
pub async fn detect_mfa(page: &dyn PageDriver) -> Option<MfaKind> {
    for (kind, indicators) in MFA_DETECTORS {
        for indicator in *indicators {
            if indicator.is_present(page).await {
                tracing::debug!("MFA indicator {:?} matched ({})", indicator, kind);
                return Some(*kind);
            }
        }
    }
    None
}

/// Produces codes for an MFA challenge.
#[async_trait]
pub trait MfaCodeProvider: Send + Sync {
    /// Code to enter right now
    async fn current_code(&self) -> Result<String>;
}

/// Hands out one fixed code, e.g. typed in on the command line.
#[derive(Clone)]
pub struct StaticCodeProvider {
    code: Zeroizing<String>,
}

impl StaticCodeProvider {
    /// Provider answering with `code`.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: Zeroizing::new(code.into().trim().to_string()),
        }
    }
}

impl fmt::Debug for StaticCodeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCodeProvider")
            .field("code", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl MfaCodeProvider for StaticCodeProvider {
    async fn current_code(&self) -> Result<String> {
        if self.code.is_empty() {
            return Err(AuthError::Mfa("empty MFA code".to_string()));
        }
        Ok(self.code.to_string())
    }
}

/// RFC 6238 time-based codes (HMAC-SHA1, 30 second step, 6 digits).
#[derive(Clone)]
pub struct TotpProvider {
    key: Zeroizing<Vec<u8>>,
}

impl TotpProvider {
    /// Seconds each code is valid for
    pub const STEP_SECS: u64 = 30;
    /// Digits per code
    pub const DIGITS: u32 = 6;

    /// Build from a base32 secret as shown during authenticator setup.
    ///
    /// Spaces and `=` padding are ignored, case is not significant.
    pub fn new(secret: &str) -> Result<Self> {
        let cleaned: String = secret
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let key = BASE32_NOPAD
            .decode(cleaned.as_bytes())
            .map_err(|e| AuthError::Mfa(format!("TOTP secret is not valid base32: {e}")))?;
        if key.is_empty() {
            return Err(AuthError::Mfa("TOTP secret is empty".to_string()));
        }
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    /// Code for the step containing `unix_secs`.
    #[must_use]
    pub fn code_at(&self, unix_secs: u64) -> String {
        self.code_for_step(unix_secs / Self::STEP_SECS)
    }

    /// Code for the current time.
    #[must_use]
    pub fn now(&self) -> String {
        self.code_at(unix_now())
    }

    /// Seconds until the code at `unix_secs` rotates (1 to 30).
    #[must_use]
    pub fn seconds_remaining_at(unix_secs: u64) -> u64 {
        Self::STEP_SECS - unix_secs % Self::STEP_SECS
    }

    /// Seconds until the current code rotates.
    #[must_use]
    pub fn seconds_remaining() -> u64 {
        Self::seconds_remaining_at(unix_now())
    }

    /// Whether `code` is valid at `unix_secs`, allowing one step of drift.
    #[must_use]
    pub fn verify_at(&self, code: &str, unix_secs: u64) -> bool {
        let step = unix_secs / Self::STEP_SECS;
        let code = code.trim();
        [step.checked_sub(1), Some(step), step.checked_add(1)]
            .into_iter()
            .flatten()
            .any(|s| self.code_for_step(s) == code)
    }

    /// Whether `code` is valid now, allowing one step of drift.
    #[must_use]
    pub fn verify(&self, code: &str) -> bool {
        self.verify_at(code, unix_now())
    }

    fn code_for_step(&self, step: u64) -> String {
        // HMAC accepts keys of any length
        let Ok(mut mac) = HmacSha1::new_from_slice(&self.key) else {
            return String::new();
        };
        mac.update(&step.to_be_bytes());
        let digest = mac.finalize().into_bytes();

        let offset = usize::from(digest[digest.len() - 1] & 0x0f);
        let binary = (u32::from(digest[offset]) & 0x7f) << 24
            | u32::from(digest[offset + 1]) << 16
            | u32::from(digest[offset + 2]) << 8
            | u32::from(digest[offset + 3]);
        let code = binary % 10u32.pow(Self::DIGITS);
        format!("{code:0width$}", width = Self::DIGITS as usize)
    }
}

impl fmt::Debug for TotpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpProvider")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl MfaCodeProvider for TotpProvider {
    async fn current_code(&self) -> Result<String> {
        Ok(self.now())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B seed "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_secret_forms() {
        let plain = TotpProvider::new(RFC_SECRET).unwrap();
        let padded = TotpProvider::new("MZXW6YQ=").unwrap();
        let lower = TotpProvider::new("mzxw6yq").unwrap();
        assert_eq!(plain.code_at(59), "287082");
        assert_eq!(padded.code_at(59), lower.code_at(59));
        assert_ne!(padded.code_at(59), plain.code_at(59));

        let err = TotpProvider::new("MZXW6YQ1").unwrap_err();
        assert!(err.to_string().contains("not valid base32"));
        // Trailing bits must be zero
        assert!(TotpProvider::new("MZXW6YR").is_err());
    }

    #[test]
    fn test_rfc6238_vectors() {
        let totp = TotpProvider::new(RFC_SECRET).unwrap();
        assert_eq!(totp.code_at(59), "287082");
        assert_eq!(totp.code_at(1_111_111_109), "081804");
        assert_eq!(totp.code_at(1_111_111_111), "050471");
        assert_eq!(totp.code_at(1_234_567_890), "005924");
        assert_eq!(totp.code_at(2_000_000_000), "279037");
    }

    #[test]
    fn test_secret_cleanup() {
        let spaced = TotpProvider::new("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap();
        assert_eq!(spaced.code_at(59), "287082");
        assert!(TotpProvider::new("not base32!").is_err());
        assert!(TotpProvider::new("   ").is_err());
    }

    #[test]
    fn test_code_shape() {
        let totp = TotpProvider::new("JBSWY3DPEHPK3PXP").unwrap();
        let code = totp.now();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_seconds_remaining() {
        assert_eq!(TotpProvider::seconds_remaining_at(0), 30);
        assert_eq!(TotpProvider::seconds_remaining_at(59), 1);
        assert_eq!(TotpProvider::seconds_remaining_at(61), 29);
        assert!((1..=30).contains(&TotpProvider::seconds_remaining()));
    }

    #[test]
    fn test_verify_allows_one_step_of_drift() {
        let totp = TotpProvider::new(RFC_SECRET).unwrap();
        let t = 1_111_111_109;
        let code = totp.code_at(t);
        assert!(totp.verify_at(&code, t));
        assert!(totp.verify_at(&code, t + 30));
        assert!(totp.verify_at(&code, t - 30));
        assert!(!totp.verify_at(&code, t + 90));
        assert!(!totp.verify_at("000000x", t));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let totp = TotpProvider::new(RFC_SECRET).unwrap();
        assert!(!format!("{totp:?}").contains("GEZD"));
        let fixed = StaticCodeProvider::new("123456");
        assert!(!format!("{fixed:?}").contains("123456"));
    }

    #[tokio::test]
    async fn test_static_provider() {
        assert_eq!(
            StaticCodeProvider::new(" 123456 ").current_code().await.unwrap(),
            "123456"
        );
        assert!(StaticCodeProvider::new("").current_code().await.is_err());
    }

    #[test]
    fn test_detector_order() {
        let kinds: Vec<MfaKind> = MFA_DETECTORS.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![MfaKind::Totp, MfaKind::Sms, MfaKind::Email]);
        assert_eq!(MfaKind::Email.to_string(), "email");
    }
}
