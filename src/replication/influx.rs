//! InfluxDB v2 replication sink
//!
//! Samples become points in the configured measurement (default
//! `naira_samples`) tagged by `node_id`, `source`, `metric`, `unit` and
//! `quality` with one float field `value`. Device status goes to
//! `naira_device_status`, tagged by `node_id` and `status`, with one field per
//! metric that is present.
//!
//! The sink resolves to a disabled null object whenever it cannot be used:
//! disabled in config, incomplete credentials, HTTP client or URL setup
//! failure. It never returns an error to the caller.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, instrument, warn};

use super::ReplicationSink;
use super::line_protocol::{Point, encode_batch};
use crate::config::ReplicationConfig;
use crate::util::parse_timestamp;
use crate::{DeviceStatus, Sample};

const STATUS_MEASUREMENT: &str = "naira_device_status";

/// Sink writing to the InfluxDB v2 HTTP API
pub struct InfluxSink {
    /// `None` when replication is disabled
    client: Option<InfluxClient>,
    measurement: String,
}

struct InfluxClient {
    http: reqwest::Client,
    write_url: Url,
    token: String,
}

/// Reasons a record cannot become a point
#[derive(Debug)]
enum PointError {
    MissingTag(&'static str),
    /// The line protocol has no escape for line breaks
    LineBreakInTag(&'static str),
    TimestampOutOfRange,
}

impl fmt::Display for PointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointError::MissingTag(tag) => write!(f, "missing required tag {}", tag),
            PointError::LineBreakInTag(tag) => write!(f, "line break in tag {}", tag),
            PointError::TimestampOutOfRange => write!(f, "timestamp out of range"),
        }
    }
}

impl InfluxSink {
    /// Build the sink from configuration, downgrading to disabled on any
    /// problem.
    pub fn new(config: &ReplicationConfig) -> Self {
        if !config.enabled {
            warn!("InfluxDB replication disabled by configuration");
            return Self::disabled();
        }

        let (Some(url), Some(token), Some(org), Some(bucket)) = (
            non_empty(&config.url),
            non_empty(&config.token),
            non_empty(&config.org),
            non_empty(&config.bucket),
        ) else {
            warn!("InfluxDB enabled but connection parameters are incomplete, disabling replication");
            return Self::disabled();
        };

        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
        {
            Ok(http) => http,
            Err(e) => {
                warn!("could not initialize InfluxDB client: {e}");
                return Self::disabled();
            }
        };

        let endpoint = format!("{}/api/v2/write", url.trim_end_matches('/'));
        let write_url = match Url::parse_with_params(
            &endpoint,
            &[("org", org), ("bucket", bucket), ("precision", "ns")],
        ) {
            Ok(write_url) => write_url,
            Err(e) => {
                warn!("invalid InfluxDB url {url}: {e}");
                return Self::disabled();
            }
        };

        info!("replication to InfluxDB enabled: {url} bucket={bucket}");

        Self {
            client: Some(InfluxClient {
                http,
                write_url,
                token: token.to_string(),
            }),
            measurement: config.measurement.clone(),
        }
    }

    /// A sink that drops every write
    pub fn disabled() -> Self {
        Self {
            client: None,
            measurement: String::new(),
        }
    }

    fn sample_point(&self, sample: &Sample) -> Result<Point, PointError> {
        if sample.node_id.is_empty() {
            return Err(PointError::MissingTag("node_id"));
        }
        if sample.metric.is_empty() {
            return Err(PointError::MissingTag("metric"));
        }
        let timestamp_ns = sample
            .timestamp
            .timestamp_nanos_opt()
            .ok_or(PointError::TimestampOutOfRange)?;

        // the line protocol has no NaN/inf
        let value = if sample.value.is_finite() {
            sample.value
        } else {
            0.0
        };

        Ok(Point::new(&self.measurement, timestamp_ns)
            .tag("node_id", single_line("node_id", &sample.node_id)?)
            .tag("source", sample.source.as_str())
            .tag("metric", single_line("metric", &sample.metric)?)
            .tag("unit", single_line("unit", sample.unit.as_deref().unwrap_or(""))?)
            .tag("quality", sample.quality.as_str())
            .field("value", value))
    }

    fn status_point(node_id: &str, status: &DeviceStatus) -> Result<Point, PointError> {
        let timestamp_ns = resolve_timestamp(status.timestamp.as_deref())
            .timestamp_nanos_opt()
            .ok_or(PointError::TimestampOutOfRange)?;

        let mut point = Point::new(STATUS_MEASUREMENT, timestamp_ns)
            .tag("node_id", single_line("node_id", node_id)?)
            .tag("status", single_line("status", &status.status)?);

        let fields = [
            ("cpu_pct", status.cpu_pct),
            ("ram_pct", status.ram_pct),
            ("disk_pct", status.disk_pct),
            ("temp_c", status.temp_c),
            ("uptime_s", status.uptime_s),
        ];
        for (name, value) in fields {
            if let Some(value) = value.filter(|v| v.is_finite()) {
                point = point.field(name, value);
            }
        }

        Ok(point)
    }

    async fn send(client: &InfluxClient, body: String) -> Result<(), reqwest::Error> {
        client
            .http
            .post(client.write_url.clone())
            .header(AUTHORIZATION, format!("Token {}", client.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl ReplicationSink for InfluxSink {
    #[instrument(skip_all, fields(metric = %sample.metric))]
    async fn write_sample(&self, sample: &Sample) {
        let Some(client) = &self.client else {
            debug!("influx sink not ready, skipping sample");
            return;
        };

        let line = match self.sample_point(sample) {
            Ok(point) => point.to_line(),
            Err(e) => {
                warn!("sample not replicated: {e}");
                return;
            }
        };

        if let Some(line) = line
            && let Err(e) = Self::send(client, line).await
        {
            warn!("could not replicate metric {} to InfluxDB: {e}", sample.metric);
        }
    }

    #[instrument(skip_all, fields(count = samples.len()))]
    async fn write_samples(&self, samples: &[Sample]) {
        if samples.is_empty() {
            return;
        }
        let Some(client) = &self.client else {
            debug!("influx sink not ready, skipping batch of {}", samples.len());
            return;
        };

        let points: Vec<Point> = samples
            .iter()
            .filter_map(|sample| match self.sample_point(sample) {
                Ok(point) => Some(point),
                Err(e) => {
                    debug!("sample {:?} dropped from replication batch: {e}", sample.metric);
                    None
                }
            })
            .collect();

        if points.is_empty() {
            return;
        }

        if let Err(e) = Self::send(client, encode_batch(&points)).await {
            warn!("error replicating batch to InfluxDB: {e}");
        }
    }

    #[instrument(skip_all, fields(node_id = %node_id))]
    async fn write_device_status(&self, node_id: &str, status: &DeviceStatus) {
        let Some(client) = &self.client else {
            debug!("influx sink not ready, skipping device status");
            return;
        };

        let line = match Self::status_point(node_id, status) {
            Ok(point) => point.to_line(),
            Err(e) => {
                warn!("device status not replicated: {e}");
                return;
            }
        };

        let Some(line) = line else {
            debug!("device status carries no numeric field, nothing to replicate");
            return;
        };

        if let Err(e) = Self::send(client, line).await {
            warn!("could not replicate status of node {node_id}: {e}");
        }
    }

    fn is_enabled(&self) -> bool {
        self.client.is_some()
    }
}

/// Resolve a producer-supplied timestamp, falling back to now when missing
/// or unparseable.
pub fn resolve_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    match raw {
        Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
            debug!("invalid timestamp for InfluxDB ({raw}), using current time");
            Utc::now()
        }),
        None => Utc::now(),
    }
}

fn single_line<'a>(tag: &'static str, value: &'a str) -> Result<&'a str, PointError> {
    if value.contains(['\n', '\r']) {
        return Err(PointError::LineBreakInTag(tag));
    }
    Ok(value)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
