//! TruckTech Core - Foundation crate for the TruckTech+ portal scraper.
//!
//! This crate provides shared types, error handling, configuration management
//! and credential lookup that all other TruckTech crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths and env overrides
//! - [`credentials`] - Portal credentials from the environment or a JSON file
//! - [`types`] - Shared newtypes (`TenantId`) and VIN checks
//!
//! # Example
//!
//! ```rust
//! use trucktech_core::{AppConfig, TenantId};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! assert_eq!(config.portal.login_url(), "https://paccar.decisiv.net/login");
//!
//! let tenant = TenantId::new("fleet-east")?;
//! assert_eq!(tenant.as_str(), "fleet-east");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, AuthConfig, BrowserConfig, ExtractionConfig, PortalConfig, SelectorConfig,
};
pub use credentials::Credentials;
pub use error::{ConfigError, ConfigResult, Result, TruckTechError};
pub use types::{is_well_formed_vin, TenantId};
