use std::path::PathBuf;

use anyhow::Context;
use tracing::trace;

use crate::util;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default = "crate::util::get_default_node_id")]
    pub node_id: String,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,
}

/// Serial device the readings arrive on
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baudrate")]
    pub baudrate: u32,

    /// Upper bound for one blocking line read
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Local SQLite store
#[derive(Debug, Clone, serde::Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Samples older than this are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

/// External time-series replica (InfluxDB v2)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ReplicationConfig {
    pub url: Option<String>,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_measurement")]
    pub measurement: String,

    #[serde(default = "default_replication_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_id: util::get_default_node_id(),
            serial: SerialConfig::default(),
            storage: StorageConfig::default(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baudrate: default_baudrate(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            org: None,
            bucket: None,
            enabled: false,
            measurement: default_measurement(),
            timeout_secs: default_replication_timeout_secs(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baudrate() -> u32 {
    9600
}

fn default_timeout_secs() -> u64 {
    2
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/naira_sensors.db")
}

fn default_retention_days() -> u32 {
    30
}

fn default_measurement() -> String {
    "naira_samples".to_string()
}

fn default_replication_timeout_secs() -> u64 {
    10
}

impl Config {
    /// Overlay `NAIRA_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(node_id) = util::get_node_id() {
            self.node_id = node_id;
        }
        if let Some(port) = util::get_serial_port() {
            self.serial.port = port;
        }
        if let Some(path) = util::get_db_path() {
            self.storage.path = PathBuf::from(path);
        }

        let replication = &mut self.replication;
        if let Some(url) = util::get_influx_url() {
            replication.url = Some(url);
        }
        if let Some(token) = util::get_influx_token() {
            replication.token = Some(token);
        }
        if let Some(org) = util::get_influx_org() {
            replication.org = Some(org);
        }
        if let Some(bucket) = util::get_influx_bucket() {
            replication.bucket = Some(bucket);
        }
        if let Some(enabled) = util::get_influx_enabled() {
            replication.enabled = enabled;
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .context("Invalid configuration file provided!")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
