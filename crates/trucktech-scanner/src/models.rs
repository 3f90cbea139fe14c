//! Records extracted from the portal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use trucktech_core::TenantId;

/// SPNs that mean a derate or shutdown is imminent.
pub const CRITICAL_SPNS: [u32; 5] = [
    3363, // Aftertreatment DEF tank level low
    3364, // DEF quality
    4364, // SCR NOx conversion efficiency
    5246, // SCR operator inducement
    1569, // Engine protection torque derate
];

/// Latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A vehicle from the asset roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vin: String,
    pub unit_number: String,
    pub year: Option<u16>,
    pub make: String,
    pub model: String,
    pub engine_make: Option<String>,
    pub engine_model: Option<String>,
    pub odometer: Option<u64>,
    pub engine_hours: Option<u64>,
    pub status: String,
    pub last_location: Option<GeoPoint>,
    pub faults: Vec<FaultCode>,
    pub extracted_at: DateTime<Utc>,
}

impl Vehicle {
    /// A vehicle with only its identity known.
    pub fn new(vin: impl Into<String>, unit_number: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            unit_number: unit_number.into(),
            year: None,
            make: String::new(),
            model: String::new(),
            engine_make: None,
            engine_model: None,
            odometer: None,
            engine_hours: None,
            status: "unknown".to_string(),
            last_location: None,
            faults: Vec::new(),
            extracted_at: Utc::now(),
        }
    }

    /// Build from the four roster fields.
    pub fn from_roster_fields(fields: RosterFields) -> Self {
        let (year, make, model) = split_year_make_model(&fields.year_make_model);
        Self {
            year,
            make,
            model,
            status: fields.status,
            ..Self::new(fields.vin, fields.unit_number)
        }
    }

    /// Number of critical faults attached.
    #[must_use]
    pub fn critical_fault_count(&self) -> usize {
        self.faults.iter().filter(|f| f.is_critical()).count()
    }
}

/// Raw text of one roster entry, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterFields {
    pub vin: String,
    pub unit_number: String,
    pub year_make_model: String,
    pub status: String,
}

/// Split a combined "2020 Kenworth T680" field.
///
/// The first word must be a year; otherwise the whole field is the make.
/// The model keeps any further words.
#[must_use]
pub fn split_year_make_model(field: &str) -> (Option<u16>, String, String) {
    let field = field.trim();
    let (first, rest) = split_word(field);

    match first.parse::<u16>() {
        Ok(year) => {
            let (make, model) = split_word(rest);
            (Some(year), make.to_string(), model.to_string())
        }
        Err(_) => (None, field.to_string(), String::new()),
    }
}

fn split_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Fault severity as shown by the portal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
    #[default]
    Unknown,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Unknown => "unknown",
        })
    }
}

/// A J1939 diagnostic trouble code on one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultCode {
    pub vin: String,
    pub spn: u32,
    pub fmi: u32,
    pub source_address: u8,
    pub description: String,
    pub severity: Severity,
    pub is_active: bool,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub occurrence_count: u32,
    pub raw_text: String,
}

impl FaultCode {
    /// An active fault of unknown severity, seen once.
    pub fn new(vin: impl Into<String>, spn: u32, fmi: u32) -> Self {
        Self {
            vin: vin.into(),
            spn,
            fmi,
            source_address: 0,
            description: String::new(),
            severity: Severity::Unknown,
            is_active: true,
            first_seen: None,
            last_seen: None,
            occurrence_count: 1,
            raw_text: String::new(),
        }
    }

    /// `SPN{spn}-FMI{fmi}`
    #[must_use]
    pub fn code_identifier(&self) -> String {
        format!("SPN{}-FMI{}", self.spn, self.fmi)
    }

    /// Whether the fault needs immediate attention.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        CRITICAL_SPNS.contains(&self.spn) || self.severity == Severity::Critical
    }
}

/// Outcome of one sync.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResult {
    pub tenant_id: TenantId,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub vehicles_found: usize,
    pub faults_found: usize,
    /// Always 0; telling new faults from known ones needs history the scraper does not keep
    pub new_faults: usize,
    pub critical_faults: usize,
    pub errors: Vec<String>,
    pub success: bool,
}

impl SyncResult {
    /// A sync starting now.
    pub fn start(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            started_at: Utc::now(),
            completed_at: None,
            vehicles_found: 0,
            faults_found: 0,
            new_faults: 0,
            critical_faults: 0,
            errors: Vec::new(),
            success: false,
        }
    }

    /// Stamp the completion time.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Seconds between start and completion, `None` while running.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> Option<f64> {
        self.completed_at.map(|done| {
            let elapsed = done - self.started_at;
            elapsed
                .num_microseconds()
                .map_or(elapsed.num_milliseconds() as f64 / 1e3, |us| us as f64 / 1e6)
        })
    }

    /// Flat form for JSON output.
    #[must_use]
    pub fn to_summary(&self) -> SyncSummary {
        SyncSummary {
            tenant_id: self.tenant_id.to_string(),
            started_at: self.started_at.to_rfc3339(),
            completed_at: self.completed_at.map(|t| t.to_rfc3339()),
            duration_seconds: self.duration_seconds(),
            vehicles_found: self.vehicles_found,
            faults_found: self.faults_found,
            new_faults: self.new_faults,
            critical_faults: self.critical_faults,
            errors: self.errors.clone(),
            success: self.success,
        }
    }
}

/// Serialisable sync summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub tenant_id: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_seconds: Option<f64>,
    pub vehicles_found: usize,
    pub faults_found: usize,
    pub new_faults: usize,
    pub critical_faults: usize,
    pub errors: Vec<String>,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_year_make_model() {
        assert_eq!(
            split_year_make_model("2020 Kenworth T680"),
            (Some(2020), "Kenworth".to_string(), "T680".to_string())
        );
        assert_eq!(
            split_year_make_model("  2019 Peterbilt 579 Day Cab "),
            (Some(2019), "Peterbilt".to_string(), "579 Day Cab".to_string())
        );
        assert_eq!(
            split_year_make_model("2021"),
            (Some(2021), String::new(), String::new())
        );
        assert_eq!(
            split_year_make_model("Kenworth T680"),
            (None, "Kenworth T680".to_string(), String::new())
        );
        assert_eq!(split_year_make_model(""), (None, String::new(), String::new()));
    }

    #[test]
    fn test_vehicle_from_roster_fields() {
        let vehicle = Vehicle::from_roster_fields(RosterFields {
            vin: "1XKYD49X0LJ123456".to_string(),
            unit_number: "T-104".to_string(),
            year_make_model: "2020 Kenworth T680".to_string(),
            status: "Active".to_string(),
        });
        assert_eq!(vehicle.year, Some(2020));
        assert_eq!(vehicle.make, "Kenworth");
        assert_eq!(vehicle.model, "T680");
        assert_eq!(vehicle.status, "Active");
        assert!(vehicle.faults.is_empty());
        assert!(vehicle.odometer.is_none());
    }

    #[test]
    fn test_vehicle_defaults() {
        let vehicle = Vehicle::new("1XKYD49X0LJ123456", "T-104");
        assert_eq!(vehicle.status, "unknown");
        assert!(vehicle.last_location.is_none());
    }

    #[test]
    fn test_code_identifier() {
        assert_eq!(FaultCode::new("VIN", 3363, 1).code_identifier(), "SPN3363-FMI1");
    }

    #[test]
    fn test_is_critical() {
        for spn in CRITICAL_SPNS {
            assert!(FaultCode::new("VIN", spn, 0).is_critical(), "SPN {spn}");
        }

        let mut fault = FaultCode::new("VIN", 100, 1);
        assert!(!fault.is_critical());
        fault.severity = Severity::Critical;
        assert!(fault.is_critical());
        fault.severity = Severity::Major;
        assert!(!fault.is_critical());
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Major).unwrap(), "\"major\"");
        assert_eq!(Severity::default(), Severity::Unknown);
        assert_eq!(Severity::Minor.to_string(), "minor");
    }

    #[test]
    fn test_duration_only_after_completion() {
        let mut result = SyncResult::start(TenantId::default());
        assert!(result.duration_seconds().is_none());

        result.completed_at = Some(result.started_at + chrono::Duration::milliseconds(1500));
        assert_eq!(result.duration_seconds(), Some(1.5));
    }

    #[test]
    fn test_summary_fields() {
        let mut result = SyncResult::start(TenantId::new("fleet-east").unwrap());
        result.vehicles_found = 3;
        result.faults_found = 4;
        result.critical_faults = 1;
        result.errors.push("Failed to get faults for X: boom".to_string());
        result.success = true;
        result.complete();

        let json = serde_json::to_value(result.to_summary()).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        for key in [
            "tenant_id",
            "started_at",
            "completed_at",
            "duration_seconds",
            "vehicles_found",
            "faults_found",
            "new_faults",
            "critical_faults",
            "errors",
            "success",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(json["tenant_id"], "fleet-east");
        assert_eq!(json["new_faults"], 0);
        assert!(json["completed_at"].is_string());
    }

    #[test]
    fn test_summary_before_completion() {
        let summary = SyncResult::start(TenantId::default()).to_summary();
        assert!(summary.completed_at.is_none());
        assert!(summary.duration_seconds.is_none());
        assert!(!summary.success);
    }
}
