//! Row types returned by the sample store
//!
//! Tables (see `migrations/`):
//!
//! - `sensor_samples(id, ts, node_id, source, metric, value, unit, quality, created_at)`
//! - `daily_aggregates(id, date, node_id, metric, value_min, value_max, value_avg, value_count, unit, created_at)`
//! - `device_status(id, ts, node_id, status, cpu_pct, ram_pct, disk_pct, temp_c, uptime_s, created_at)`
//!
//! `ts` columns hold ISO-8601 UTC text with a trailing `Z`, see
//! [`format_timestamp`](crate::util::format_timestamp).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{DeviceStatus, Sample};

/// A persisted sample together with its row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub id: i64,

    #[serde(flatten)]
    pub sample: Sample,
}

/// Min/max/mean summary of one metric on one node for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub node_id: String,
    pub metric: String,
    pub value_min: f64,
    pub value_max: f64,

    /// Plain arithmetic mean
    pub value_avg: f64,
    pub value_count: i64,

    /// Unit of the first sample of the day
    pub unit: Option<String>,
}

/// A persisted aggregate; recomputing a day appends another one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregateRow {
    pub id: i64,

    #[serde(flatten)]
    pub aggregate: DailyAggregate,
    pub created_at: String,
}

/// A persisted device-status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatusRow {
    pub id: i64,
    pub node_id: String,

    #[serde(flatten)]
    pub status: DeviceStatus,
}

/// Read-only summary of the sample table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_samples: i64,
    pub distinct_metrics: i64,
    pub earliest_timestamp: Option<String>,
    pub latest_timestamp: Option<String>,
    pub store_size_bytes: u64,
}

impl DailyAggregate {
    /// Summarize `values`, or `None` when there is nothing to summarize.
    pub fn from_values(
        date: NaiveDate,
        node_id: &str,
        metric: &str,
        values: &[f64],
        unit: Option<String>,
    ) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let value_min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let value_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let value_avg = values.iter().sum::<f64>() / values.len() as f64;

        Some(Self {
            date,
            node_id: node_id.to_string(),
            metric: metric.to_string(),
            value_min,
            value_max,
            value_avg,
            value_count: values.len() as i64,
            unit,
        })
    }
}

impl StoreStats {
    /// Database size in MiB, as shown by the CLI
    pub fn store_size_mb(&self) -> f64 {
        self.store_size_bytes as f64 / (1024.0 * 1024.0)
    }
}
