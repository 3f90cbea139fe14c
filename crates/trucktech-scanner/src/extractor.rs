//! Roster and diagnostics extraction on a signed-in page.

use crate::error::{Result, ScanError};
use crate::models::{FaultCode, Vehicle};
use crate::parser::{default_roster_strategies, parse_fault_row, RosterStrategy};
use trucktech_browser::{PageDriver, PageElement};
use trucktech_core::{
    is_well_formed_vin, AppConfig, ExtractionConfig, PortalConfig, SelectorConfig,
};

/// Reads vehicles and their faults off the portal.
pub struct ExtractionEngine<'a> {
    page: &'a dyn PageDriver,
    portal: PortalConfig,
    selectors: SelectorConfig,
    extraction: ExtractionConfig,
    strategies: Vec<Box<dyn RosterStrategy>>,
}

impl<'a> ExtractionEngine<'a> {
    /// Engine driving `page`, which must already be signed in.
    pub fn new(page: &'a dyn PageDriver, config: &AppConfig) -> Self {
        Self {
            page,
            portal: config.portal.clone(),
            selectors: config.selectors.clone(),
            extraction: config.extraction.clone(),
            strategies: default_roster_strategies(),
        }
    }

    /// Replace the roster layouts tried, in order.
    #[must_use]
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn RosterStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Fetch the asset roster.
    ///
    /// Faults are not attached; see [`ExtractionEngine::fetch_faults`].
    pub async fn fetch_roster(&self) -> Result<Vec<Vehicle>> {
        tracing::info!("Fetching vehicle list...");
        let url = self.portal.assets_url();
        self.page.navigate(&url).await?;

        if let Err(e) = self
            .page
            .wait_for_any_selector(&self.selectors.roster_ready, self.extraction.page_timeout())
            .await
        {
            let current = self.page.current_url().await?;
            if self.portal.is_login_url(&current) {
                return Err(ScanError::SessionExpired("Session expired".to_string()));
            }
            tracing::debug!("Roster wait failed: {}", e);
            return Err(ScanError::ExtractionFailed {
                page_url: current,
                detail: "Timeout waiting for vehicle list".to_string(),
            });
        }

        let mut entries = Vec::new();
        for strategy in &self.strategies {
            entries = strategy.extract(self.page, &self.selectors).await?;
            if !entries.is_empty() {
                tracing::debug!("Roster read as {} ({} entries)", strategy.name(), entries.len());
                break;
            }
        }

        let vehicles: Vec<Vehicle> = entries
            .into_iter()
            .map(Vehicle::from_roster_fields)
            .inspect(|v| {
                if !is_well_formed_vin(&v.vin) {
                    tracing::debug!("Unit '{}' has an unusual VIN '{}'", v.unit_number, v.vin);
                }
            })
            .collect();

        tracing::info!("Found {} vehicles", vehicles.len());
        Ok(vehicles)
    }

    /// Fetch the fault codes of one vehicle.
    ///
    /// Rows without an SPN/FMI pair, or that cannot be read, are skipped.
    pub async fn fetch_faults(&self, vin: &str) -> Result<Vec<FaultCode>> {
        let url = self.portal.diagnostics_url(vin);
        self.page.navigate(&url).await?;

        if let Err(e) = self
            .page
            .wait_for_any_selector(&self.selectors.faults_ready, self.extraction.page_timeout())
            .await
        {
            let current = self.page.current_url().await?;
            if self.portal.is_login_url(&current) {
                return Err(ScanError::SessionExpired("Session expired".to_string()));
            }
            // No faults or page structure unknown
            tracing::warn!("No diagnostics found for {} ({}), assuming no faults", vin, e);
            return Ok(Vec::new());
        }

        if let Some(banner) = self.page.query_selector(&self.selectors.no_faults).await? {
            if banner.text().await?.to_lowercase().contains("no") {
                tracing::debug!("{}: no faults", vin);
                return Ok(Vec::new());
            }
        }

        let rows = self.page.query_all(&self.selectors.fault_rows).await?;
        let mut faults = Vec::new();
        for row in &rows {
            match self.parse_row(vin, row.as_ref()).await {
                Ok(Some(fault)) => faults.push(fault),
                Ok(None) => {}
                Err(e) => tracing::debug!("Skipping unreadable fault row for {}: {}", vin, e),
            }
        }

        tracing::debug!("{}: {} faults from {} rows", vin, faults.len(), rows.len());
        Ok(faults)
    }

    async fn parse_row(&self, vin: &str, row: &dyn PageElement) -> Result<Option<FaultCode>> {
        let raw_text = row.text().await?;
        let class = row.attribute("class").await?.unwrap_or_default();
        let style = row.attribute("style").await?.unwrap_or_default();
        Ok(parse_fault_row(
            vin,
            &raw_text,
            &format!("{class} {style}"),
            self.extraction.description_max_chars,
        ))
    }
}
