//! Builds the canonical [`Sample`] from a parsed reading

use chrono::{DateTime, Utc};

use super::parser::ParsedReading;
use super::quality::assess;
use crate::Sample;
use crate::util::truncate_timestamp;

/// Normalize a reading taken now, at the precision the store keeps.
pub fn normalize(parsed: &ParsedReading, node_id: &str) -> Sample {
    normalize_at(parsed, node_id, truncate_timestamp(Utc::now()))
}

/// Normalize a reading taken at `timestamp`.
///
/// A missing source defaults to `meteo`; unit passes through untouched.
pub fn normalize_at(parsed: &ParsedReading, node_id: &str, timestamp: DateTime<Utc>) -> Sample {
    Sample {
        timestamp,
        node_id: node_id.to_string(),
        source: parsed.source.unwrap_or_default(),
        metric: parsed.metric.clone(),
        value: parsed.value,
        unit: parsed.unit.clone(),
        quality: assess(&parsed.metric, parsed.value),
    }
}
