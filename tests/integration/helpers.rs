//! Helper functions for integration tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use naira_edge::config::ReplicationConfig;
use naira_edge::replication::ReplicationSink;
use naira_edge::storage::SampleStore;
use naira_edge::{DeviceStatus, Quality, Sample, Source};
use tempfile::TempDir;

/// Sink that records what it was asked to replicate
#[derive(Default)]
pub struct RecordingSink {
    pub samples: Mutex<Vec<Sample>>,
    pub batches: Mutex<Vec<Vec<Sample>>>,
    pub statuses: Mutex<Vec<(String, DeviceStatus)>>,
}

#[async_trait]
impl ReplicationSink for RecordingSink {
    async fn write_sample(&self, sample: &Sample) {
        self.samples.lock().unwrap().push(sample.clone());
    }

    async fn write_samples(&self, samples: &[Sample]) {
        self.batches.lock().unwrap().push(samples.to_vec());
    }

    async fn write_device_status(&self, node_id: &str, status: &DeviceStatus) {
        self.statuses
            .lock()
            .unwrap()
            .push((node_id.to_string(), status.clone()));
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

pub fn create_test_sample(metric: &str, value: f64, timestamp: DateTime<Utc>) -> Sample {
    Sample {
        timestamp,
        node_id: "naira-node-001".to_string(),
        source: Source::Meteo,
        metric: metric.to_string(),
        value,
        unit: None,
        quality: Quality::Ok,
    }
}

pub async fn create_test_store(sink: Arc<dyn ReplicationSink>) -> (TempDir, SampleStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = SampleStore::open(temp_dir.path().join("naira_sensors.db"), sink)
        .await
        .unwrap();
    (temp_dir, store)
}

pub async fn create_recording_store() -> (TempDir, SampleStore, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let (temp_dir, store) = create_test_store(sink.clone()).await;
    (temp_dir, store, sink)
}

pub fn create_influx_config(url: &str) -> ReplicationConfig {
    ReplicationConfig {
        url: Some(url.to_string()),
        token: Some("test-token".to_string()),
        org: Some("naira".to_string()),
        bucket: Some("sensors".to_string()),
        enabled: true,
        timeout_secs: 2,
        ..ReplicationConfig::default()
    }
}
