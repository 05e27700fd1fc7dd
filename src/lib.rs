pub mod acquisition;
pub mod collector;
pub mod config;
pub mod monitors;
pub mod replication;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sensor observation in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the reading was taken (always UTC)
    pub timestamp: DateTime<Utc>,

    /// Originating device, stable per deployment
    pub node_id: String,

    /// Coarse origin tag
    #[serde(default)]
    pub source: Source,

    /// Canonical metric name (e.g. "temp_aire")
    pub metric: String,

    pub value: f64,

    /// Display unit, informational only
    pub unit: Option<String>,

    #[serde(default)]
    pub quality: Quality,
}

/// Coarse origin of a sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Weather / ambient sensors
    #[default]
    Meteo,

    /// Soil probes
    Suelo,

    /// Irrigation hardware
    Riego,
}

/// Plausibility classification of a sample value.
///
/// `Suspect` is part of the vocabulary stored in the database but no range
/// rule currently produces it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    #[default]
    Ok,
    Suspect,
    Bad,
}

/// System-health snapshot pushed by the node monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// ISO-8601 instant as supplied by the producer; `None` means "now"
    #[serde(default, rename = "ts")]
    pub timestamp: Option<String>,

    /// Free-form state, usually ok/warning/error
    #[serde(default = "default_status")]
    pub status: String,

    pub cpu_pct: Option<f64>,
    pub ram_pct: Option<f64>,
    pub disk_pct: Option<f64>,
    pub temp_c: Option<f64>,
    pub uptime_s: Option<f64>,
}

fn default_status() -> String {
    "ok".to_string()
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self {
            timestamp: None,
            status: default_status(),
            cpu_pct: None,
            ram_pct: None,
            disk_pct: None,
            temp_c: None,
            uptime_s: None,
        }
    }
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Meteo => "meteo",
            Source::Suelo => "suelo",
            Source::Riego => "riego",
        }
    }

    /// Unknown tags fall back to the default origin.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "suelo" => Source::Suelo,
            "riego" => Source::Riego,
            _ => Source::Meteo,
        }
    }
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Ok => "ok",
            Quality::Suspect => "suspect",
            Quality::Bad => "bad",
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "suspect" => Quality::Suspect,
            "bad" => Quality::Bad,
            _ => Quality::Ok,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
