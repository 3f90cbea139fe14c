use crate::mfa::MfaKind;
use thiserror::Error;
use trucktech_browser::BrowserError;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Credentials rejected or the portal answered unexpectedly
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// A second factor is required and nothing can answer it
    #[error(
        "MFA ({kind}) is required but not configured. \
         Run with TRUCKTECH_HEADLESS=false to complete it manually, or configure a TOTP secret"
    )]
    MfaRequired {
        /// Challenge the portal presented
        kind: MfaKind,
    },

    /// An MFA code could not be produced
    #[error("MFA error: {0}")]
    Mfa(String),

    /// No authenticated page to hand out
    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl AuthError {
    /// Wrap an unexpected browser fault during login.
    pub(crate) fn login_failed(err: BrowserError) -> Self {
        Self::LoginFailed(err.to_string())
    }
}

/// Result type for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
