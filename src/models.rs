use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::TelemetryError;

/// Single hydrometer reading as returned by the telemetry API
///
/// Gravity is expressed in gravity points (1034 means SG 1.034).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSample {
    #[serde(with = "time::serde::rfc3339")]
    pub created_on: OffsetDateTime,
    pub gravity: f64,
    pub temperature: f64,
    pub battery: f64,
    pub rssi: i32,
}

/// Raw reading plus the metrics derived from the original gravity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedSample {
    #[serde(flatten)]
    pub raw: RawSample,
    pub abv: f64,
    pub attenuation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity_velocity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSessionRef {
    pub id: String,
}

/// Hydrometer as listed by the API, carrying enriched telemetry after a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active_profile_session: Option<ProfileSessionRef>,
    #[serde(default)]
    pub telemetry: Vec<EnrichedSample>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub is_latest_firmware: Option<bool>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_activity_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub battery: Option<f64>,
    #[serde(default)]
    pub rssi: Option<i32>,
}

impl Device {
    /// Id of the active profile session, ignoring blank ids
    pub fn active_session_id(&self) -> Option<&str> {
        self.active_profile_session
            .as_ref()
            .map(|session| session.id.as_str())
            .filter(|id| !id.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub original_gravity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// Temperature bounds in °C used to classify readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    pub danger_min: f64,
    pub warning_min: f64,
    pub warning_max: f64,
    pub danger_max: f64,
}

impl ThresholdConfig {
    /// Build a threshold set, rejecting bounds that are out of order
    pub fn new(
        danger_min: f64,
        warning_min: f64,
        warning_max: f64,
        danger_max: f64,
    ) -> Result<Self, TelemetryError> {
        let ordered =
            danger_min <= warning_min && warning_min <= warning_max && warning_max <= danger_max;
        if !ordered {
            return Err(TelemetryError::InvalidThresholds {
                danger_min,
                warning_min,
                warning_max,
                danger_max,
            });
        }

        Ok(ThresholdConfig {
            danger_min,
            warning_min,
            warning_max,
            danger_max,
        })
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        ThresholdConfig {
            danger_min: 18.0,
            warning_min: 20.0,
            warning_max: 26.0,
            danger_max: 28.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Good,
    Warning,
    Danger,
}

/// Result of one enrichment pass, handed to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentSnapshot {
    pub devices: Vec<Device>,
    pub config: ThresholdConfig,
}
