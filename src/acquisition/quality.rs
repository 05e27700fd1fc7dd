//! Plausibility check of a value against per-metric ranges

use tracing::warn;

use super::{HUMEDAD_SUELO, LUMINOSIDAD, TEMP_AIRE};
use crate::Quality;

/// Inclusive plausible ranges per metric
const PLAUSIBLE_RANGES: &[(&str, f64, f64)] = &[
    (TEMP_AIRE, -10.0, 60.0),
    // raw analog readings
    (HUMEDAD_SUELO, 0.0, 1023.0),
    (LUMINOSIDAD, 0.0, 1023.0),
];

/// Classify `value` for `metric`.
///
/// Values outside the metric's range are `Bad`; metrics without a range are
/// always `Ok`. NaN compares false against both bounds and stays `Ok`.
pub fn assess(metric: &str, value: f64) -> Quality {
    let Some((_, min, max)) = PLAUSIBLE_RANGES.iter().find(|(name, _, _)| *name == metric) else {
        return Quality::Ok;
    };

    if value < *min || value > *max {
        warn!("value out of range for {metric}: {value}");
        Quality::Bad
    } else {
        Quality::Ok
    }
}
