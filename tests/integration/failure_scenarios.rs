//! Failure tests for the acquisition pipeline
//!
//! These tests verify that the system handles failures gracefully:
//! - Storage failures end one cycle, not the loop
//! - Unusable replication settings fall back to a disabled sink
//! - An unreachable store degrades read-only statistics

use std::io::{self, Cursor};
use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;
use naira_edge::collector::{BufLineSource, ConnectionState, LineSource, SerialCollector};
use naira_edge::config::{ReplicationConfig, SerialConfig};
use naira_edge::replication::{InfluxSink, ReplicationSink};
use naira_edge::storage::{SampleStore, StorageError, StoreStats};
use tokio::sync::watch;

use crate::helpers::*;

/// Source whose device has gone away
struct FailingSource;

impl LineSource for FailingSource {
    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
    }
}

#[tokio::test]
async fn test_storage_failure_does_not_stop_loop() {
    let (dir, store, sink) = create_recording_store().await;
    let store = Arc::new(store);

    let mut collector = SerialCollector::new(SerialConfig::default(), "naira-node-001", store.clone());
    collector.attach(Box::new(BufLineSource::new(Cursor::new(
        b"temperature 20\nlight 5\n".to_vec(),
    ))));

    // the database file vanishes under the collector
    std::fs::remove_dir_all(dir.path()).unwrap();

    let (_tx, rx) = watch::channel(false);
    let saved = collector.read_and_store_loop(Some(2), &rx).await;

    assert_eq!(saved, 0);
    assert!(collector.last_values().is_empty());
    assert!(sink.samples.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_dropped_connection_yields_empty_reads() {
    let (_dir, store, _) = create_recording_store().await;
    let serial = SerialConfig {
        timeout_secs: 0,
        ..SerialConfig::default()
    };
    let mut collector = SerialCollector::new(serial, "naira-node-001", Arc::new(store));
    collector.attach(Box::new(FailingSource));

    assert!(collector.read_line().await.is_none());
    assert_eq!(collector.state(), ConnectionState::Connected);

    let (_tx, rx) = watch::channel(false);
    assert_eq!(collector.read_and_store_loop(Some(3), &rx).await, 0);
}

#[tokio::test]
async fn test_single_insert_failure_is_reported() {
    let (_dir, store, sink) = create_recording_store().await;

    let result = store
        .insert_sample(&create_test_sample("", 1.0, Utc::now()))
        .await;

    assert_matches!(result, Err(StorageError::QueryFailed(_)));
    assert!(sink.samples.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_open_on_unwritable_path_fails() {
    let temp_dir = tempfile::tempdir().unwrap();
    let blocker = temp_dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let result = SampleStore::open(blocker.join("naira.db"), Arc::new(InfluxSink::disabled())).await;

    assert_matches!(result.err(), Some(StorageError::IoError(_)));
}

#[tokio::test]
async fn test_stats_degrade_when_store_is_gone() {
    let (dir, store, _) = create_recording_store().await;
    store
        .insert_sample(&create_test_sample("temp_aire", 20.0, Utc::now()))
        .await
        .unwrap();

    std::fs::remove_dir_all(dir.path()).unwrap();

    assert_eq!(store.get_stats().await, StoreStats::default());
    assert_eq!(store.delete_older_than(0).await, 0);
    assert!(store.get_samples(None, 10).await.is_err());
}

#[test]
fn test_incomplete_replication_config_disables_sink() {
    let complete = create_influx_config("http://localhost:8086");

    let incomplete = [
        ReplicationConfig {
            url: None,
            ..complete.clone()
        },
        ReplicationConfig {
            token: Some(String::new()),
            ..complete.clone()
        },
        ReplicationConfig {
            org: None,
            ..complete.clone()
        },
        ReplicationConfig {
            bucket: None,
            ..complete.clone()
        },
    ];

    for config in &incomplete {
        assert!(!InfluxSink::new(config).is_enabled());
    }
    assert!(InfluxSink::new(&complete).is_enabled());
}
