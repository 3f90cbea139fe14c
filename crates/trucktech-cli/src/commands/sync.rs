//! `trucktech sync`

use super::build_authenticator;
use crate::LoginArgs;
use anyhow::Context;
use std::path::Path;
use trucktech_auth::Authenticator;
use trucktech_core::{AppConfig, TenantId};
use trucktech_scanner::{SyncOrchestrator, SyncResult, SyncSummary};

/// Run a full export and emit the summary. Returns whether the sync succeeded.
pub async fn run(
    config: AppConfig,
    tenant: &str,
    output: Option<&Path>,
    login: &LoginArgs,
) -> anyhow::Result<bool> {
    let tenant = TenantId::new(tenant)?;
    let authenticator = build_authenticator(&config, login).await;
    sync_with(config, tenant, output, authenticator).await
}

/// Sync with an already prepared authenticator. Any failure, including one
/// building the authenticator, still produces a summary.
async fn sync_with(
    config: AppConfig,
    tenant: TenantId,
    output: Option<&Path>,
    authenticator: anyhow::Result<Authenticator>,
) -> anyhow::Result<bool> {
    let result = match authenticator {
        Ok(authenticator) => match SyncOrchestrator::new(config)
            .run(authenticator, tenant.clone())
            .await
        {
            Ok(report) => report.result,
            Err(e) => {
                tracing::error!("Sync failed: {}", e);
                failed_result(tenant, &e)
            }
        },
        Err(e) => {
            tracing::error!("Sync failed before login: {:#}", e);
            failed_result(tenant, &format!("{e:#}"))
        }
    };

    write_summary(&result.to_summary(), output)?;
    Ok(result.success)
}

fn failed_result(tenant: TenantId, error: &dyn std::fmt::Display) -> SyncResult {
    let mut result = SyncResult::start(tenant);
    result.errors.push(format!("Sync failed: {error}"));
    result.complete();
    result
}

fn write_summary(summary: &SyncSummary, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write summary to {}", path.display()))?;
            tracing::info!("Summary written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result() {
        let result = failed_result(TenantId::default(), &"login failed: bad password");
        assert!(!result.success);
        assert!(result.completed_at.is_some());
        assert_eq!(result.errors, vec!["Sync failed: login failed: bad password"]);
    }

    #[test]
    fn test_summary_written_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let result = failed_result(TenantId::new("fleet-east").unwrap(), &"boom");

        write_summary(&result.to_summary(), Some(&path)).unwrap();

        let written: SyncSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, result.to_summary());
        assert_eq!(written.tenant_id, "fleet-east");
    }

    #[tokio::test]
    async fn test_setup_failure_still_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let setup = Err(anyhow::anyhow!("no credentials").context("failed to launch Chromium"));

        let success = sync_with(
            AppConfig::default(),
            TenantId::new("fleet-east").unwrap(),
            Some(&path),
            setup,
        )
        .await
        .unwrap();

        assert!(!success);
        let written: SyncSummary =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(!written.success);
        assert_eq!(written.tenant_id, "fleet-east");
        assert_eq!(
            written.errors,
            vec!["Sync failed: failed to launch Chromium: no credentials"]
        );
    }
}
