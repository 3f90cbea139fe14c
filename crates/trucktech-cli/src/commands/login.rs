//! `trucktech test-login`

use super::build_authenticator;
use crate::LoginArgs;
use trucktech_core::AppConfig;

/// Sign in once and release the browser. Returns whether login succeeded.
pub async fn run(config: AppConfig, login: &LoginArgs) -> anyhow::Result<bool> {
    let mut authenticator = build_authenticator(&config, login).await?;

    let ok = match authenticator.login().await {
        Ok(outcome) => {
            tracing::info!("Login successful ({:?})", outcome);
            println!("Login successful");
            true
        }
        Err(e) => {
            tracing::error!("Login failed: {}", e);
            println!("Login failed: {e}");
            false
        }
    };

    if let Err(e) = authenticator.close().await {
        tracing::warn!("Failed to release browser: {}", e);
    }
    Ok(ok)
}
