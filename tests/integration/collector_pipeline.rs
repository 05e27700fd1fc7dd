//! End-to-end acquisition: serial lines in, stored and replicated samples out

use std::io::Cursor;
use std::sync::Arc;

use naira_edge::collector::{BufLineSource, SerialCollector};
use naira_edge::config::SerialConfig;
use naira_edge::{Quality, Source};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

use crate::helpers::*;

fn line_source(lines: &str) -> Box<BufLineSource<Cursor<Vec<u8>>>> {
    Box::new(BufLineSource::new(Cursor::new(lines.as_bytes().to_vec())))
}

#[tokio::test]
async fn test_arduino_sequence_is_stored_in_order() {
    let (_dir, store, sink) = create_recording_store().await;
    let store = Arc::new(store);

    let mut collector = SerialCollector::new(SerialConfig::default(), "naira-node-001", store.clone());
    collector.attach(line_source("moisture 800\r\nlight 5.00\r\ntemperature 18.96\r\n"));

    let (_tx, rx) = watch::channel(false);
    assert_eq!(collector.read_and_store_loop(Some(3), &rx).await, 3);

    let mut rows = store.get_samples(None, 10).await.unwrap();
    rows.reverse();

    let metrics: Vec<&str> = rows.iter().map(|r| r.sample.metric.as_str()).collect();
    assert_eq!(metrics, vec!["humedad_suelo", "luminosidad", "temp_aire"]);
    assert!(rows.iter().all(|r| r.sample.quality == Quality::Ok));
    assert_eq!(rows[0].sample.source, Source::Suelo);
    assert_eq!(rows[2].sample.value, 18.96);

    assert_eq!(sink.samples.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_out_of_range_reading_is_kept_as_bad() {
    let (_dir, store, _) = create_recording_store().await;
    let store = Arc::new(store);

    let mut collector = SerialCollector::new(SerialConfig::default(), "naira-node-001", store.clone());
    collector.attach(line_source("temperature -50\n"));

    assert!(collector.read_and_store_one().await);

    let rows = store.get_samples(Some("temp_aire"), 1).await.unwrap();
    assert_eq!(rows[0].sample.quality, Quality::Bad);
    assert_eq!(collector.last_values()["temp_aire"], -50.0);
}

#[tokio::test]
async fn test_noise_between_readings_is_ignored() {
    let (_dir, store, sink) = create_recording_store().await;
    let store = Arc::new(store);

    let mut collector = SerialCollector::new(SerialConfig::default(), "naira-node-001", store);
    collector.attach(line_source(
        "boot ok\n\npressure 1013.25\ntemperature abc\ntemperature23.45\nlight 512\n",
    ));

    let (_tx, rx) = watch::channel(false);
    let saved = collector.read_and_store_loop(Some(6), &rx).await;

    assert_eq!(saved, 1);
    assert_eq!(sink.samples.lock().unwrap()[0].metric, "luminosidad");
    assert_eq!(collector.store_stats().await.total_samples, 1);
}
