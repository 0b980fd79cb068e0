/// Temperature and battery classification of readings
use crate::models::{Device, EnrichedSample, Severity, ThresholdConfig};

/// Battery percentage below which a device is flagged
pub const LOW_BATTERY_PERCENT: f64 = 20.0;

/// Classify a temperature against the configured bounds
///
/// An active cold crash turns anything below `danger_min` into `Good`; the
/// high side is unaffected.
pub fn classify(temperature: f64, config: &ThresholdConfig, cold_crash: bool) -> Severity {
    if cold_crash && temperature < config.danger_min {
        return Severity::Good;
    }

    if temperature < config.danger_min || temperature > config.danger_max {
        Severity::Danger
    } else if temperature < config.warning_min || temperature > config.warning_max {
        Severity::Warning
    } else {
        Severity::Good
    }
}

pub fn is_low_battery(battery: f64) -> bool {
    battery < LOW_BATTERY_PERCENT
}

/// Describe which danger bound a temperature violates and by how much
pub fn danger_message(
    temperature: f64,
    config: &ThresholdConfig,
    cold_crash: bool,
) -> Option<String> {
    if classify(temperature, config, cold_crash) != Severity::Danger {
        return None;
    }

    if temperature < config.danger_min {
        Some(format!(
            "Temperature {:.1}°C is {:.1}°C below the danger minimum of {:.1}°C",
            temperature,
            config.danger_min - temperature,
            config.danger_min
        ))
    } else {
        Some(format!(
            "Temperature {:.1}°C is {:.1}°C above the danger maximum of {:.1}°C",
            temperature,
            temperature - config.danger_max,
            config.danger_max
        ))
    }
}

/// Display state of a device's most recent reading
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingStatus {
    pub sample: EnrichedSample,
    pub severity: Severity,
    pub low_battery: bool,
    pub warning: Option<String>,
}

/// Chronologically latest sample of a device's series
pub fn latest_sample(device: &Device) -> Option<&EnrichedSample> {
    device
        .telemetry
        .iter()
        .max_by_key(|sample| sample.raw.created_on)
}

/// Classify the latest reading with the thresholds in effect right now
pub fn assess_latest(
    device: &Device,
    config: &ThresholdConfig,
    cold_crash: bool,
) -> Option<ReadingStatus> {
    let sample = latest_sample(device)?;
    let temperature = sample.raw.temperature;

    Some(ReadingStatus {
        sample: sample.clone(),
        severity: classify(temperature, config, cold_crash),
        low_battery: is_low_battery(sample.raw.battery),
        warning: danger_message(temperature, config, cold_crash),
    })
}
