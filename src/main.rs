mod api;
mod config;
mod error;
mod models;
mod pipeline;
mod utils;

use log::{error, info, warn};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use api::{HttpAuthProvider, HttpTelemetrySource, TelemetrySource, TokenCache};
use config::AppConfig;
use error::{ErrorResponse, TelemetryError};
use models::{EnrichmentSnapshot, Severity};
use pipeline::{assess_latest, fetch_snapshot, EnrichmentOptions};
use utils::{duration_to_seconds, format_datetime};

/// Log a per-device summary of the latest readings
fn log_summary(snapshot: &EnrichmentSnapshot, cold_crash: bool) {
    for device in &snapshot.devices {
        info!("Summary for {} ({}):", device.name, device.id);

        if device.is_latest_firmware == Some(false) {
            warn!(
                "  Firmware {} is outdated",
                device.firmware_version.as_deref().unwrap_or("unknown")
            );
        }

        let status = match assess_latest(device, &snapshot.config, cold_crash) {
            Some(status) => status,
            None => {
                info!("  No data in the requested window");
                continue;
            }
        };

        let sample = &status.sample;
        info!("  Last reading at: {}", format_datetime(&sample.raw.created_on));
        info!("  Gravity: {:.1}", sample.raw.gravity);
        info!("  ABV: {:.2}%", sample.abv);
        info!("  Attenuation: {:.2}%", sample.attenuation);
        if let Some(velocity) = sample.gravity_velocity {
            info!("  Gravity velocity: {:.2} points/day", velocity);
        }
        info!(
            "  Temperature: {:.1}°C ({:?})",
            sample.raw.temperature, status.severity
        );
        info!("  Battery: {:.0}%, RSSI: {}", sample.raw.battery, sample.raw.rssi);

        if status.low_battery {
            warn!("  Battery low on {}", device.name);
        }
        if let Some(message) = &status.warning {
            warn!("  {}: {}", device.name, message);
        } else if status.severity == Severity::Warning {
            warn!("  {}: temperature outside the preferred range", device.name);
        }
    }

    if snapshot.devices.is_empty() {
        warn!("No devices returned by the telemetry API!");
    }
}

/// JSON handed to stdout: the snapshot, or the error object if the pass failed
fn render_json(result: &Result<EnrichmentSnapshot, TelemetryError>) -> serde_json::Result<String> {
    match result {
        Ok(snapshot) => serde_json::to_string_pretty(snapshot),
        Err(e) => serde_json::to_string_pretty(&ErrorResponse::from(e)),
    }
}

/// Run one enrichment pass and report it
async fn run_pass(
    source: &dyn TelemetrySource,
    config: &AppConfig,
    options: &EnrichmentOptions,
) -> Result<(), TelemetryError> {
    let now = OffsetDateTime::now_utc();
    info!("Starting enrichment pass at: {}", format_datetime(&now));

    let result = fetch_snapshot(source, options, config.thresholds, now).await;
    if let Ok(snapshot) = &result {
        log_summary(snapshot, config.cold_crash);
    }

    if config.print_json {
        match render_json(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to serialize pass output: {}", e),
        }
    }

    result.map(|_| ())
}

async fn main_loop(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting hydrometer telemetry service");

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let auth = HttpAuthProvider::new(
        client.clone(),
        config.auth_url.clone(),
        config.credentials.clone(),
    );
    let tokens = Arc::new(TokenCache::new(Arc::new(auth)));
    let source = HttpTelemetrySource::new(client, config.api_url.clone(), tokens);

    let options = EnrichmentOptions {
        manual_og: config.manual_og,
        lookback_hours: config.lookback_hours,
    };

    loop {
        let start_time = OffsetDateTime::now_utc();

        if let Err(e) = run_pass(&source, &config, &options).await {
            let response = ErrorResponse::from(&e);
            error!(
                "Enrichment pass failed ({}): {}",
                response.status, response.error
            );
            if config.poll_interval_secs == 0 {
                return Err(e.into());
            }
        }

        if config.poll_interval_secs == 0 {
            return Ok(());
        }

        // Wait until next pass should start
        let elapsed = duration_to_seconds(OffsetDateTime::now_utc() - start_time);
        let wait_time = config.poll_interval_secs.saturating_sub(elapsed);
        if wait_time > 0 {
            info!("Waiting {} seconds until next enrichment pass", wait_time);
            sleep(Duration::from_secs(wait_time)).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match AppConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        let _ = tx.send(());
    });

    // Run main loop or wait for shutdown signal
    tokio::select! {
        result = main_loop(config) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => {
                    error!("Fatal error: {}", e);
                    return Err(e);
                }
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
