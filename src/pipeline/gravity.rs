/// Original gravity resolution for a device's fermentation
use crate::models::{Device, Profile, RawSample};

/// Where a resolved original gravity came from, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OgSource {
    ProfileSession,
    Manual,
    EarliestSample,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedGravity {
    /// Gravity points, e.g. 1063.0
    pub value: f64,
    pub source: OgSource,
}

/// Normalize a configured gravity to gravity points
///
/// Values below 2.0 are taken as specific gravity (1.063) and scaled up.
/// Non-finite or non-positive values count as absent.
pub fn to_gravity_points(value: f64) -> Option<f64> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    if value < 2.0 {
        Some(value * 1000.0)
    } else {
        Some(value)
    }
}

/// Original gravity recorded on the profile session with the given id
pub fn session_original_gravity(profiles: &[Profile], session_id: &str) -> Option<f64> {
    profiles
        .iter()
        .flat_map(|profile| profile.sessions.iter())
        .find(|session| session.id == session_id)
        .and_then(|session| session.original_gravity)
        .and_then(to_gravity_points)
}

/// Gravity of the chronologically earliest sample
///
/// Samples sharing the earliest timestamp resolve to the first one in input order.
pub fn earliest_sample_gravity(samples: &[RawSample]) -> Option<f64> {
    samples
        .iter()
        .enumerate()
        .min_by_key(|(index, sample)| (sample.created_on, *index))
        .map(|(_, sample)| sample.gravity)
}

/// Resolve the original gravity for one enrichment pass over `telemetry`
///
/// First match wins: the device's active profile session, then the manual
/// override, then the earliest sample. Returns None for empty telemetry so
/// no metrics are derived from a fabricated baseline.
pub fn resolve_original_gravity(
    device: &Device,
    telemetry: &[RawSample],
    profiles: &[Profile],
    manual_og: Option<f64>,
) -> Option<ResolvedGravity> {
    if telemetry.is_empty() {
        return None;
    }

    if let Some(value) = device
        .active_session_id()
        .and_then(|id| session_original_gravity(profiles, id))
    {
        return Some(ResolvedGravity {
            value,
            source: OgSource::ProfileSession,
        });
    }

    if let Some(value) = manual_og.and_then(to_gravity_points) {
        return Some(ResolvedGravity {
            value,
            source: OgSource::Manual,
        });
    }

    earliest_sample_gravity(telemetry).map(|value| ResolvedGravity {
        value,
        source: OgSource::EarliestSample,
    })
}
