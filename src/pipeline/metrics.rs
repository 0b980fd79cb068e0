/// ABV, attenuation and gravity velocity derived from gravity readings
use crate::models::{EnrichedSample, RawSample};
use crate::utils::round_to;

// Simple homebrew ABV estimate: (OG - FG) * 131.25, gravities in SG
const ABV_FACTOR: f64 = 131.25;
const SECONDS_PER_DAY: f64 = 86_400.0;

fn to_specific_gravity(points: f64) -> f64 {
    points / 1000.0
}

/// Alcohol by volume in percent, never negative, two decimal places
pub fn compute_abv(og_points: f64, gravity_points: f64) -> f64 {
    let og = to_specific_gravity(og_points);
    let fg = to_specific_gravity(gravity_points);
    round_to(((og - fg) * ABV_FACTOR).max(0.0), 2)
}

/// Apparent attenuation in percent
///
/// Left unclamped: noisy readings can push it below 0 or above 100.
/// An original gravity of exactly 1.000 yields 0.
pub fn compute_attenuation(og_points: f64, gravity_points: f64) -> f64 {
    let og = to_specific_gravity(og_points);
    let fg = to_specific_gravity(gravity_points);
    let fermentable = og - 1.0;
    if fermentable == 0.0 {
        return 0.0;
    }
    (og - fg) / fermentable * 100.0
}

/// Gravity change in points per day for each sample, in input order
///
/// Each sample is compared with the closest sample carrying a strictly
/// earlier timestamp. Samples with no such predecessor get None.
pub fn gravity_velocities(samples: &[RawSample]) -> Vec<Option<f64>> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by_key(|&i| samples[i].created_on);

    let mut velocities = vec![None; samples.len()];
    let mut previous: Option<usize> = None;

    for (position, &index) in order.iter().enumerate() {
        let current = &samples[index];
        if position > 0 {
            let before = order[position - 1];
            if samples[before].created_on != current.created_on {
                previous = Some(before);
            }
        }

        if let Some(prev) = previous {
            let prev = &samples[prev];
            let days = (current.created_on - prev.created_on).as_seconds_f64() / SECONDS_PER_DAY;
            velocities[index] = Some(round_to((current.gravity - prev.gravity) / days, 2));
        }
    }

    velocities
}

/// Derive one enriched sample per raw sample against a fixed original gravity
pub fn derive_metrics(samples: &[RawSample], og_points: f64) -> Vec<EnrichedSample> {
    samples
        .iter()
        .zip(gravity_velocities(samples))
        .map(|(sample, gravity_velocity)| EnrichedSample {
            raw: sample.clone(),
            abv: compute_abv(og_points, sample.gravity),
            attenuation: compute_attenuation(og_points, sample.gravity),
            gravity_velocity,
        })
        .collect()
}
