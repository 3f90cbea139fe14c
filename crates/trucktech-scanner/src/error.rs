use std::time::Duration;
use thiserror::Error;
use trucktech_auth::AuthError;
use trucktech_browser::BrowserError;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Failed to extract data from {page_url}: {detail}")]
    ExtractionFailed { page_url: String, detail: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),
}

impl ScanError {
    /// Whether the portal signed us out.
    #[must_use]
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
