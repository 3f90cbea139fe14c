//! Sync orchestrator.
//!
//! Runs one full export: sign in, read the roster, then read the faults of
//! each vehicle in turn. A vehicle whose diagnostics fail is recorded and
//! skipped; only a roster failure ends the sync early.

use crate::error::Result;
use crate::extractor::ExtractionEngine;
use crate::models::{SyncResult, Vehicle};
use trucktech_auth::Authenticator;
use trucktech_browser::PageDriver;
use trucktech_core::{AppConfig, TenantId};

/// Result of a sync together with the vehicles it read.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Counts and errors
    pub result: SyncResult,
    /// Vehicles with their faults attached
    pub vehicles: Vec<Vehicle>,
}

/// Coordinates login and extraction for a sync.
pub struct SyncOrchestrator {
    config: AppConfig,
}

impl SyncOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Sign in with `authenticator`, export everything, and release the
    /// browser whatever happens.
    pub async fn run(&self, mut authenticator: Authenticator, tenant: TenantId) -> Result<SyncReport> {
        match authenticator.login().await {
            Ok(outcome) => tracing::info!("Signed in ({:?})", outcome),
            Err(e) => {
                if let Err(close_err) = authenticator.close().await {
                    tracing::warn!("Failed to release browser: {}", close_err);
                }
                return Err(e.into());
            }
        }

        let session = authenticator.into_session().await?;
        let report = self.export_all(session.page(), tenant).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Failed to release browser: {}", e);
        }
        Ok(report)
    }

    /// Export all vehicles and their faults from a signed-in `page`.
    ///
    /// Never fails: problems are collected in [`SyncResult::errors`].
    pub async fn export_all(&self, page: &dyn PageDriver, tenant: TenantId) -> SyncReport {
        let engine = ExtractionEngine::new(page, &self.config);
        let mut result = SyncResult::start(tenant);
        tracing::info!("Starting sync for tenant {}", result.tenant_id);

        let mut vehicles = match engine.fetch_roster().await {
            Ok(vehicles) => vehicles,
            Err(e) => {
                tracing::error!("Sync failed: {}", e);
                result.errors.push(format!("Sync failed: {e}"));
                result.success = false;
                return Self::finish(result, Vec::new());
            }
        };
        result.vehicles_found = vehicles.len();
        result.success = true;

        for vehicle in &mut vehicles {
            match engine.fetch_faults(&vehicle.vin).await {
                Ok(faults) => {
                    vehicle.faults = faults;
                    result.faults_found += vehicle.faults.len();
                    result.critical_faults += vehicle.critical_fault_count();
                }
                Err(e) => {
                    tracing::warn!("Failed to get faults for {}: {}", vehicle.vin, e);
                    result
                        .errors
                        .push(format!("Failed to get faults for {}: {e}", vehicle.vin));
                }
            }
        }

        Self::finish(result, vehicles)
    }

    fn finish(mut result: SyncResult, vehicles: Vec<Vehicle>) -> SyncReport {
        result.complete();

        tracing::info!(
            "Sync completed in {:.1}s",
            result.duration_seconds().unwrap_or_default()
        );
        tracing::info!("  Vehicles: {}", result.vehicles_found);
        tracing::info!(
            "  Faults: {} ({} critical)",
            result.faults_found,
            result.critical_faults
        );
        if !result.errors.is_empty() {
            tracing::info!("  Errors: {}", result.errors.len());
        }

        SyncReport { result, vehicles }
    }
}
