//! TruckTech Scanner - Fleet data extraction.
//!
//! This crate turns the portal's asset roster and per-vehicle diagnostics
//! pages into typed [`Vehicle`] and [`FaultCode`] records, and runs whole
//! syncs on top of an authenticated page.
//!
//! # Features
//!
//! - Roster parsing across the table and card layouts the portal has used
//! - SPN/FMI extraction from free-text fault rows with severity and
//!   active/historical markers
//! - Per-vehicle failure isolation during a sync
//! - Session-expiry detection on every page load
//!
//! # Example
//!
//! ```rust,ignore
//! use trucktech_scanner::SyncOrchestrator;
//!
//! let orchestrator = SyncOrchestrator::new(config.clone());
//! let report = orchestrator.run(authenticator, TenantId::default()).await?;
//! println!("{}", serde_json::to_string_pretty(&report.result.to_summary())?);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod error;
pub mod extractor;
#[allow(missing_docs)]
pub mod models;
pub mod orchestrator;
#[allow(missing_docs)]
pub mod parser;

// Re-export commonly used types
pub use error::{Result, ScanError};
pub use extractor::ExtractionEngine;
pub use models::{
    split_year_make_model, FaultCode, GeoPoint, RosterFields, Severity, SyncResult, SyncSummary,
    Vehicle, CRITICAL_SPNS,
};
pub use orchestrator::{SyncOrchestrator, SyncReport};
pub use parser::{
    classify_markers, parse_fault_row, parse_spn_fmi, truncate_chars, Cards, RosterStrategy,
    TableRows,
};
