/// Error taxonomy for talking to the telemetry API and enriching its data
use serde::Serialize;
use thiserror::Error;

/// Status reported to callers when an enrichment pass fails outright
pub const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("failed to fetch device list: {0}")]
    DeviceList(String),

    #[error("failed to fetch telemetry for device {device_id}: {reason}")]
    TelemetryFetch { device_id: String, reason: String },

    #[error("profile session lookup failed: {0}")]
    ProfileLookup(String),

    #[error(
        "invalid thresholds: expected \
         {danger_min} <= {warning_min} <= {warning_max} <= {danger_max}"
    )]
    InvalidThresholds {
        danger_min: f64,
        warning_min: f64,
        warning_max: f64,
        danger_max: f64,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TelemetryError {
    /// Authentication failures abort a pass instead of degrading per device
    pub fn is_auth(&self) -> bool {
        matches!(self, TelemetryError::Auth(_))
    }
}

/// Error object returned in place of a snapshot when a pass fails
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl From<&TelemetryError> for ErrorResponse {
    fn from(err: &TelemetryError) -> Self {
        ErrorResponse {
            error: err.to_string(),
            status: SERVICE_UNAVAILABLE,
        }
    }
}
