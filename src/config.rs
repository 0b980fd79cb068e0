use std::env;
use url::Url;

use crate::api::Credentials;
use crate::models::ThresholdConfig;

const DEFAULT_API_URL: &str = "https://api.rapt.io";
const DEFAULT_AUTH_URL: &str = "https://id.rapt.io/connect/token";
const DEFAULT_CLIENT_ID: &str = "rapt-user";
const DEFAULT_LOOKBACK_HOURS: u32 = 24;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 900;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_url: Url,
    pub auth_url: Url,
    pub credentials: Credentials,
    pub manual_og: Option<f64>,
    pub thresholds: ThresholdConfig,
    pub cold_crash: bool,
    pub lookback_hours: u32,
    pub poll_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub print_json: bool,
}

impl AppConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key -> value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_url = get("TELEMETRY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let api_url =
            Url::parse(&api_url).map_err(|e| format!("Invalid TELEMETRY_API_URL: {}", e))?;
        let auth_url = get("TELEMETRY_AUTH_URL").unwrap_or_else(|| DEFAULT_AUTH_URL.into());
        let auth_url =
            Url::parse(&auth_url).map_err(|e| format!("Invalid TELEMETRY_AUTH_URL: {}", e))?;

        let username =
            get("TELEMETRY_USERNAME").ok_or("TELEMETRY_USERNAME environment variable not set")?;
        let secret =
            get("TELEMETRY_API_SECRET").ok_or("TELEMETRY_API_SECRET environment variable not set")?;
        let client_id = get("TELEMETRY_CLIENT_ID").unwrap_or_else(|| DEFAULT_CLIENT_ID.into());

        let manual_og = match get("MANUAL_OG") {
            Some(raw) => Some(parse_number::<f64>("MANUAL_OG", &raw)?),
            None => None,
        };

        let thresholds = parse_thresholds(&get)?;

        let cold_crash = match get("COLD_CRASH") {
            Some(raw) => parse_flag("COLD_CRASH", &raw)?,
            None => false,
        };
        let print_json = match get("PRINT_JSON") {
            Some(raw) => parse_flag("PRINT_JSON", &raw)?,
            None => false,
        };

        let lookback_hours = match get("LOOKBACK_HOURS") {
            Some(raw) => parse_number("LOOKBACK_HOURS", &raw)?,
            None => DEFAULT_LOOKBACK_HOURS,
        };
        let poll_interval_secs = match get("POLL_INTERVAL_SECS") {
            Some(raw) => parse_number("POLL_INTERVAL_SECS", &raw)?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };
        let http_timeout_secs = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => parse_number("HTTP_TIMEOUT_SECS", &raw)?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(AppConfig {
            api_url,
            auth_url,
            credentials: Credentials {
                username,
                secret,
                client_id,
            },
            manual_og,
            thresholds,
            cold_crash,
            lookback_hours,
            poll_interval_secs,
            http_timeout_secs,
            print_json,
        })
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| format!("Invalid {} value '{}': {}", key, raw, e).into())
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, Box<dyn std::error::Error>> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("Invalid {} value '{}': expected true or false", key, raw).into()),
    }
}

fn parse_thresholds<F>(get: &F) -> Result<ThresholdConfig, Box<dyn std::error::Error>>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ThresholdConfig::default();

    // Try THRESHOLDS format first
    let bounds = if let Some(combined) = get("THRESHOLDS") {
        let values = combined
            .split(',')
            .map(|part| parse_number::<f64>("THRESHOLDS", part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != 4 {
            return Err(format!(
                "THRESHOLDS needs 4 comma separated values \
                 (dangerMin,warningMin,warningMax,dangerMax), got {}",
                values.len()
            )
            .into());
        }
        [values[0], values[1], values[2], values[3]]
    } else {
        // Fallback to individual environment variables
        let bound = |key: &str, default: f64| match get(key) {
            Some(raw) => parse_number::<f64>(key, &raw),
            None => Ok(default),
        };
        [
            bound("THRESHOLD_DANGER_MIN", defaults.danger_min)?,
            bound("THRESHOLD_WARNING_MIN", defaults.warning_min)?,
            bound("THRESHOLD_WARNING_MAX", defaults.warning_max)?,
            bound("THRESHOLD_DANGER_MAX", defaults.danger_max)?,
        ]
    };

    Ok(ThresholdConfig::new(bounds[0], bounds[1], bounds[2], bounds[3])?)
}
