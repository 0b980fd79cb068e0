/// Per-device enrichment: fetch telemetry, resolve OG, derive metrics
use futures_util::future::join_all;
use log::{debug, info, warn};
use time::OffsetDateTime;

use crate::api::{TelemetrySource, TimeWindow};
use crate::error::TelemetryError;
use crate::models::{Device, EnrichmentSnapshot, Profile, RawSample, ThresholdConfig};
use crate::pipeline::gravity::resolve_original_gravity;
use crate::pipeline::metrics::derive_metrics;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentOptions {
    /// Operator supplied original gravity, used when no profile session has one
    pub manual_og: Option<f64>,
    pub lookback_hours: u32,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        EnrichmentOptions {
            manual_og: None,
            lookback_hours: 24,
        }
    }
}

/// Fetch raw samples, retrying unwindowed if the windowed call fails
///
/// A device whose telemetry cannot be fetched at all gets an empty series.
/// Authentication failures are returned instead.
pub async fn fetch_raw_telemetry(
    source: &dyn TelemetrySource,
    device_id: &str,
    window: TimeWindow,
) -> Result<Vec<RawSample>, TelemetryError> {
    match source.get_telemetry(device_id, Some(window)).await {
        Ok(samples) => return Ok(samples),
        Err(e) if e.is_auth() => return Err(e),
        Err(e) => warn!("Windowed telemetry fetch failed, retrying without window: {}", e),
    }

    match source.get_telemetry(device_id, None).await {
        Ok(samples) => Ok(samples),
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            warn!("Telemetry unavailable for device {}: {}", device_id, e);
            Ok(Vec::new())
        }
    }
}

/// Load profile sessions once per pass if any device needs them
pub async fn load_profiles(
    source: &dyn TelemetrySource,
    devices: &[Device],
) -> Result<Vec<Profile>, TelemetryError> {
    if !devices.iter().any(|device| device.active_session_id().is_some()) {
        return Ok(Vec::new());
    }

    match source.get_profile_sessions().await {
        Ok(profiles) => Ok(profiles),
        Err(e) if e.is_auth() => Err(e),
        Err(e) => {
            warn!("Profile sessions unavailable, falling back to manual or sampled OG: {}", e);
            Ok(Vec::new())
        }
    }
}

/// Attach enriched telemetry to a single device
pub async fn enrich_device(
    mut device: Device,
    source: &dyn TelemetrySource,
    profiles: &[Profile],
    manual_og: Option<f64>,
    window: TimeWindow,
) -> Result<Device, TelemetryError> {
    let samples = fetch_raw_telemetry(source, &device.id, window).await?;

    let resolved = match resolve_original_gravity(&device, &samples, profiles, manual_og) {
        Some(resolved) => resolved,
        None => {
            debug!("No telemetry for device {}, skipping enrichment", device.id);
            device.telemetry = Vec::new();
            return Ok(device);
        }
    };

    debug!(
        "Device {} original gravity {:.1} from {:?}",
        device.id, resolved.value, resolved.source
    );
    device.telemetry = derive_metrics(&samples, resolved.value);
    Ok(device)
}

/// Enrich every listed device concurrently, keeping list order
pub async fn enrich_devices(
    source: &dyn TelemetrySource,
    options: &EnrichmentOptions,
    now: OffsetDateTime,
) -> Result<Vec<Device>, TelemetryError> {
    let devices = source.list_devices().await?;
    info!("Enriching telemetry for {} devices", devices.len());

    let profiles = load_profiles(source, &devices).await?;
    let window = TimeWindow::lookback(now, options.lookback_hours);

    join_all(
        devices
            .into_iter()
            .map(|device| enrich_device(device, source, &profiles, options.manual_og, window)),
    )
    .await
    .into_iter()
    .collect()
}

/// Run one enrichment pass and pair the result with the thresholds to display it with
pub async fn fetch_snapshot(
    source: &dyn TelemetrySource,
    options: &EnrichmentOptions,
    config: ThresholdConfig,
    now: OffsetDateTime,
) -> Result<EnrichmentSnapshot, TelemetryError> {
    let devices = enrich_devices(source, options, now).await?;
    Ok(EnrichmentSnapshot { devices, config })
}
