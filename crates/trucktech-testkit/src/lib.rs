//! # TruckTech Testkit
//!
//! Test utilities for the TruckTech+ scraper.
//!
//! This crate provides:
//! - [`FakePortal`], a scripted in-memory portal implementing
//!   [`PageDriver`](trucktech_browser::PageDriver) and
//!   [`BrowserLauncher`](trucktech_browser::BrowserLauncher) over parsed HTML
//! - HTML fixtures shaped like the real portal pages
//! - [`MemorySessionStore`], an in-memory session store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trucktech_testkit::prelude::*;
//!
//! let portal = FakePortal::new(BASE_URL)
//!     .with_login("fleet@example.com", "hunter2")
//!     .protected_page("/assets", &roster_table(&[sample_row(VIN_A)]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod portal;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::portal::*;
    pub use crate::store::*;
}

pub use fixtures::*;
pub use portal::*;
pub use store::*;
