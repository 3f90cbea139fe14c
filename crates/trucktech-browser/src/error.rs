use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    Chromium(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("session state error: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BrowserError {
    /// Whether this error is a bounded wait running out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BrowserError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string());
        assert_eq!(
            err.to_string(),
            "navigation failed: net::ERR_NAME_NOT_RESOLVED"
        );
    }

    #[test]
    fn test_timeout_classification() {
        assert!(BrowserError::Timeout("table tbody tr".to_string()).is_timeout());
        assert!(!BrowserError::SelectorNotFound("#auth_key".to_string()).is_timeout());
    }
}
