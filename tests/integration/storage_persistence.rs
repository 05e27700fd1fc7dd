//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - Samples survive reopening the store
//! - Batch inserts tolerate rows rejected by the database
//! - Aggregates and retention behave across days

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use naira_edge::replication::InfluxSink;
use naira_edge::storage::SampleStore;
use pretty_assertions::assert_eq;

use crate::helpers::*;

#[tokio::test]
async fn test_samples_survive_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("data/naira_sensors.db");
    let base = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();

    {
        let store = SampleStore::open(&db_path, Arc::new(InfluxSink::disabled()))
            .await
            .unwrap();
        let samples: Vec<_> = (0..5)
            .map(|i| create_test_sample("temp_aire", 20.0 + i as f64, base + Duration::minutes(i)))
            .collect();
        assert_eq!(store.insert_samples_batch(&samples).await.unwrap(), 5);
    }

    let store = SampleStore::open(&db_path, Arc::new(InfluxSink::disabled()))
        .await
        .unwrap();
    let rows = store.get_samples(Some("temp_aire"), 10).await.unwrap();

    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].sample.value, 24.0);
    assert_eq!(rows[0].sample.timestamp, base + Duration::minutes(4));
}

#[tokio::test]
async fn test_batch_of_n_with_k_rejected() {
    let (_dir, store, sink) = create_recording_store().await;
    let now = Utc::now();

    let samples = vec![
        create_test_sample("temp_aire", 20.0, now),
        create_test_sample("", 1.0, now),
        create_test_sample("humedad_suelo", 800.0, now),
        create_test_sample("", 2.0, now),
        create_test_sample("luminosidad", 5.0, now),
    ];

    let inserted = store.insert_samples_batch(&samples).await.unwrap();
    assert_eq!(inserted, 3);

    let batches = sink.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    let replicated: Vec<&str> = batches[0].iter().map(|s| s.metric.as_str()).collect();
    assert_eq!(replicated, vec!["temp_aire", "humedad_suelo", "luminosidad"]);
}

#[tokio::test]
async fn test_range_query_across_metrics() {
    let (_dir, store, _) = create_recording_store().await;
    let base = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();

    let samples = vec![
        create_test_sample("temp_aire", 18.0, base + Duration::hours(1)),
        create_test_sample("luminosidad", 300.0, base + Duration::hours(2)),
        create_test_sample("temp_aire", 19.0, base + Duration::hours(3)),
        create_test_sample("temp_aire", 25.0, base + Duration::days(2)),
    ];
    store.insert_samples_batch(&samples).await.unwrap();

    let day = store
        .get_samples_in_range(base, base + Duration::days(1), None)
        .await
        .unwrap();
    let values: Vec<f64> = day.iter().map(|r| r.sample.value).collect();
    assert_eq!(values, vec![18.0, 300.0, 19.0]);

    let temps = store
        .get_samples_in_range(base, base + Duration::days(1), Some("temp_aire"))
        .await
        .unwrap();
    assert_eq!(temps.len(), 2);
}

#[tokio::test]
async fn test_aggregate_only_counts_its_node() {
    let (_dir, store, _) = create_recording_store().await;
    let base = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();

    let mut other_node = create_test_sample("temp_aire", 100.0, base);
    other_node.node_id = "naira-node-002".to_string();

    store
        .insert_samples_batch(&[
            create_test_sample("temp_aire", 18.0, base),
            create_test_sample("temp_aire", 22.0, base + Duration::hours(1)),
            other_node,
        ])
        .await
        .unwrap();

    let aggregate = store
        .compute_daily_aggregate(base.date_naive(), "temp_aire", "naira-node-001")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(aggregate.value_count, 2);
    assert_eq!(aggregate.value_avg, 20.0);
    assert_eq!(aggregate.value_max, 22.0);
}

#[tokio::test]
async fn test_retention_leaves_recent_rows_untouched() {
    let (_dir, store, _) = create_recording_store().await;
    let now = Utc::now();

    let samples: Vec<_> = (0..40)
        .map(|day| {
            let ts = now - Duration::days(day) + Duration::hours(1);
            create_test_sample("temp_aire", day as f64, ts)
        })
        .collect();
    store.insert_samples_batch(&samples).await.unwrap();

    // days 31..=39 are strictly before now - 30 days
    assert_eq!(store.delete_older_than(30).await, 9);

    let stats = store.get_stats().await;
    assert_eq!(stats.total_samples, 31);
    assert_eq!(store.delete_older_than(30).await, 0);
}

#[tokio::test]
async fn test_device_status_history() {
    let (_dir, store, sink) = create_recording_store().await;

    for (i, status) in ["ok", "warning", "error"].iter().enumerate() {
        let snapshot = naira_edge::DeviceStatus {
            timestamp: Some(format!("2026-05-01T10:0{i}:00")),
            status: status.to_string(),
            cpu_pct: Some(10.0 * i as f64),
            ..Default::default()
        };
        store
            .insert_device_status("naira-node-001", &snapshot)
            .await
            .unwrap();
    }

    let rows = store.get_device_status(None, 2).await.unwrap();
    let statuses: Vec<&str> = rows.iter().map(|r| r.status.status.as_str()).collect();
    assert_eq!(statuses, vec!["error", "warning"]);
    assert_eq!(sink.statuses.lock().unwrap().len(), 3);
}
