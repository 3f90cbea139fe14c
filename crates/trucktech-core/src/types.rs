//! Shared types used across the TruckTech scraper.
//!
//! This module defines common newtypes that provide type safety
//! and clear domain modeling.

use crate::error::TruckTechError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Newtype for tenant identifiers with validation.
///
/// A tenant identifies the fleet account a sync runs for. IDs are
/// alphanumeric with hyphens or underscores, 1-64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new `TenantId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, TruckTechError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), TruckTechError> {
        static TENANT_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = TENANT_REGEX
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("valid regex"));

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(TruckTechError::Validation(format!(
                "invalid tenant ID: must be 1-64 alphanumeric, '-' or '_' characters, got '{id}'"
            )))
        }
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether `vin` is a syntactically valid Vehicle Identification Number:
/// 17 characters of `A-Z`/`0-9` excluding `I`, `O` and `Q`, any case.
///
/// Scraped rosters can carry empty or truncated VINs, so vehicle records keep
/// the raw string and only use this for reporting.
#[must_use]
pub fn is_well_formed_vin(vin: &str) -> bool {
    static VIN_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        VIN_REGEX.get_or_init(|| Regex::new(r"^(?i)[A-HJ-NPR-Z0-9]{17}$").expect("valid regex"));
    regex.is_match(vin)
}
