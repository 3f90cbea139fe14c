//! Browser capability for the TruckTech+ scraper.
//!
//! The scraper core never talks to Chromium directly. It drives pages through
//! the [`PageDriver`] / [`PageElement`] traits, obtains pages from a
//! [`BrowserLauncher`] and persists logins through a [`SessionStore`].
//! [`BrowserEngine`] is the Chromium implementation of the launcher.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod network;
pub mod session;

pub use actions::{origin_of, BrowserLauncher, PageDriver, PageElement, POLL_INTERVAL};
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fingerprint::ContextProfile;
pub use network::{NetworkActivity, NETWORK_IDLE_QUIET};
pub use session::{FileSessionStore, OriginStorage, SessionState, SessionStore, StoredCookie};
