use crate::error::{BrowserError, Result};
use crate::session::SessionState;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

/// Interval between polls in the provided wait helpers.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A DOM element on a live page.
#[async_trait]
pub trait PageElement: Send + Sync {
    /// Rendered text of the element
    async fn text(&self) -> Result<String>;

    /// Attribute value, `None` when absent
    async fn attribute(&self, name: &str) -> Result<Option<String>>;

    /// Replace the value of an input
    async fn fill(&self, value: &str) -> Result<()>;

    /// Click the element
    async fn click(&self) -> Result<()>;

    /// First descendant matching `selector`
    async fn query_selector(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>>;

    /// All descendants matching `selector`, in document order
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>>;
}

/// Page automation capability the scraper core drives.
///
/// A page is a single stateful resource: callers use it from one task at a
/// time and must call [`PageDriver::close`] when done.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to a URL
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait until pending navigation and loading have quietened down
    async fn wait_for_load_settled(&self, timeout: Duration) -> Result<()>;

    /// Current location of the page
    async fn current_url(&self) -> Result<String>;

    /// First element matching `selector`
    async fn query_selector(&self, selector: &str) -> Result<Option<Box<dyn PageElement>>>;

    /// All elements matching `selector`, in document order
    async fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn PageElement>>>;

    /// Whether some element's whitespace-normalised text equals `text` exactly
    async fn has_exact_text(&self, text: &str) -> Result<bool>;

    /// Snapshot cookies and local storage so the login can be resumed later
    async fn session_state(&self) -> Result<SessionState>;

    /// Release the page
    async fn close(&self) -> Result<()>;

    /// Wait until any of `selectors` matches, returning the one that did.
    ///
    /// Selectors are checked in order on each poll. Query errors while the
    /// page is still navigating count as "no match yet".
    async fn wait_for_any_selector(&self, selectors: &[String], timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            for selector in selectors {
                match self.query_selector(selector).await {
                    Ok(Some(_)) => return Ok(selector.clone()),
                    Ok(None) => {}
                    Err(e) => tracing::trace!("query '{}' failed while waiting: {}", selector, e),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "none of [{}] appeared within {:?}",
                    selectors.join(", "),
                    timeout
                )));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Wait until the page URL contains `fragment`, returning the URL.
    async fn wait_for_url(&self, fragment: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.current_url().await {
                Ok(url) if url.contains(fragment) => return Ok(url),
                Ok(_) => {}
                Err(e) => tracing::trace!("reading URL failed while waiting: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::Timeout(format!(
                    "URL did not reach '{fragment}' within {timeout:?}"
                )));
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Fill the first element matching `selector`
    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::SelectorNotFound(selector.to_string()))?
            .fill(value)
            .await
    }

    /// Click the first element matching `selector`
    async fn click(&self, selector: &str) -> Result<()> {
        self.query_selector(selector)
            .await?
            .ok_or_else(|| BrowserError::SelectorNotFound(selector.to_string()))?
            .click()
            .await
    }
}

/// Source of pages, each in its own isolated browsing context.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Open a page in a fresh context, optionally resuming `session`
    async fn open_page(&self, session: Option<&SessionState>) -> Result<Box<dyn PageDriver>>;

    /// Whether a human can see and interact with the browser window
    fn is_interactive(&self) -> bool;

    /// Tear the browser down
    async fn shutdown(&self) -> Result<()>;
}

/// Helper to extract the origin (`scheme://host[:port]`) from a URL
pub fn origin_of(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::Navigation(format!("Invalid URL: {e}")))?;

    if url.host_str().is_none() {
        return Err(BrowserError::Navigation("No host in URL".to_string()));
    }

    Ok(url.origin().ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("https://paccar.decisiv.net/assets/123/diagnostics").unwrap(),
            "https://paccar.decisiv.net"
        );
        assert_eq!(
            origin_of("http://localhost:8080/login").unwrap(),
            "http://localhost:8080"
        );
    }

    #[test]
    fn test_origin_of_invalid() {
        assert!(origin_of("not-a-url").is_err());
        assert!(origin_of("data:text/plain,hello").is_err());
    }
}
