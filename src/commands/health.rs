//! `capvid health`: is the service up?

use tracing::warn;

use crate::config::ClientConfig;
use crate::error::AppError;
use crate::service::{CaptionApiClient, HealthReport};

const HEALTHY: &str = "healthy";

pub async fn run(config: ClientConfig) -> Result<(), AppError> {
    let report = check(&config).await?;
    match report.message {
        Some(message) => println!("{}: {}", report.status, message),
        None => println!("{}", report.status),
    }
    Ok(())
}

/// Queries the service root and requires it to report itself healthy.
pub async fn check(config: &ClientConfig) -> Result<HealthReport, AppError> {
    let client = CaptionApiClient::from_config(config)?;
    let report = client.health().await?;

    if report.status != HEALTHY {
        warn!("[HEALTH] Service reported '{}'", report.status);
        return Err(AppError::InvalidResponse(format!(
            "Service reported status '{}'",
            report.status
        )));
    }
    Ok(report)
}
