//! Line parser for the `<token> <value>` serial protocol

use tracing::warn;

use super::{HUMEDAD_SUELO, LUMINOSIDAD, TEMP_AIRE};
use crate::Source;

/// A typed but unvalidated reading
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReading {
    pub metric: String,
    pub value: f64,
    pub unit: Option<String>,
    pub source: Option<Source>,
}

struct SensorMapping {
    token: &'static str,
    metric: &'static str,
    unit: &'static str,
    source: Source,
}

const SENSOR_TABLE: &[SensorMapping] = &[
    SensorMapping {
        token: "moisture",
        metric: HUMEDAD_SUELO,
        unit: "%",
        source: Source::Suelo,
    },
    SensorMapping {
        token: "light",
        metric: LUMINOSIDAD,
        unit: "lux",
        source: Source::Meteo,
    },
    SensorMapping {
        token: "temperature",
        metric: TEMP_AIRE,
        unit: "°C",
        source: Source::Meteo,
    },
];

/// Parse one line such as `"temperature 18.96"`.
///
/// Returns `None` for empty lines, lines without a whitespace separator,
/// unknown sensor tokens and non-numeric values.
pub fn parse_line(line: &str) -> Option<ParsedReading> {
    let line = line.trim();
    let (token, value_text) = line.split_once(char::is_whitespace)?;

    let sensor_type = token.to_lowercase();
    let Some(mapping) = SENSOR_TABLE.iter().find(|m| m.token == sensor_type) else {
        warn!("unknown sensor type: {sensor_type}");
        return None;
    };

    let value = match value_text.trim().parse::<f64>() {
        Ok(value) => value,
        Err(e) => {
            warn!("could not parse line '{line}': {e}");
            return None;
        }
    };

    Some(ParsedReading {
        metric: mapping.metric.to_string(),
        value,
        unit: Some(mapping.unit.to_string()),
        source: Some(mapping.source),
    })
}
