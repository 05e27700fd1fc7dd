//! SerialCollector - drives the acquisition cycle for one node
//!
//! ## Cycle
//!
//! ```text
//! read line (blocking pool) → parse → normalize → SampleStore::insert_sample → last value cache
//! ```
//!
//! Cycles never overlap. The interrupt flag is checked between cycles, so an
//! in-flight cycle always completes (bounded by the serial timeout).
//!
//! ## Connection lifecycle
//!
//! `Disconnected → Connected → Reading → Connected → … → Disconnected`
//!
//! A lost connection is not re-established automatically: reads simply come
//! back empty until the caller stops the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::acquisition::{normalize, parse_line};
use crate::config::SerialConfig;
use crate::storage::{SampleStore, StoreStats};

pub mod serial;

pub use serial::{BufLineSource, LineSource, open_serial};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Reading,
}

/// Reads sensor lines and persists them as samples
pub struct SerialCollector {
    serial: SerialConfig,
    node_id: String,
    store: Arc<SampleStore>,

    /// Taken out while a blocking read is in flight
    source: Option<Box<dyn LineSource>>,
    state: ConnectionState,

    /// Most recent accepted value per metric
    last_values: HashMap<String, f64>,
}

impl SerialCollector {
    pub fn new(serial: SerialConfig, node_id: impl Into<String>, store: Arc<SampleStore>) -> Self {
        Self {
            serial,
            node_id: node_id.into(),
            store,
            source: None,
            state: ConnectionState::Disconnected,
            last_values: HashMap::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Open the configured serial device. Returns `false` and stays
    /// disconnected on failure.
    #[instrument(skip(self), fields(port = %self.serial.port))]
    pub fn connect(&mut self) -> bool {
        match open_serial(&self.serial) {
            Ok(source) => {
                self.attach(Box::new(source));
                info!(
                    "connected to {} at {} baud",
                    self.serial.port, self.serial.baudrate
                );
                true
            }
            Err(e) => {
                error!("could not open serial port {}: {e}", self.serial.port);
                self.source = None;
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    /// Use an already opened line source instead of the serial device.
    pub fn attach(&mut self, source: Box<dyn LineSource>) {
        self.source = Some(source);
        self.state = ConnectionState::Connected;
    }

    pub fn disconnect(&mut self) {
        if self.source.take().is_some() {
            info!("serial connection closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Read the next non-empty line, if any arrived before the timeout.
    ///
    /// Invalid UTF-8 is dropped, surrounding whitespace is stripped.
    pub async fn read_line(&mut self) -> Option<String> {
        let Some(mut source) = self.source.take() else {
            debug!("not connected, nothing to read");
            return None;
        };
        self.state = ConnectionState::Reading;

        let read = tokio::task::spawn_blocking(move || {
            let result = source.read_line();
            (source, result)
        })
        .await;

        let (source, result) = match read {
            Ok(read) => read,
            Err(e) => {
                error!("serial read task failed: {e}");
                self.state = ConnectionState::Disconnected;
                return None;
            }
        };
        self.source = Some(source);
        self.state = ConnectionState::Connected;

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("error reading serial port: {e}");
                // keep a dead device from spinning the loop
                tokio::time::sleep(Duration::from_secs(self.serial.timeout_secs)).await;
                return None;
            }
        };

        let line: String = bytes.utf8_chunks().map(|chunk| chunk.valid()).collect();
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }

    /// Run one cycle. Returns whether a sample was persisted.
    ///
    /// Storage failures are logged and end the cycle; they never escape.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub async fn read_and_store_one(&mut self) -> bool {
        let Some(line) = self.read_line().await else {
            return false;
        };
        debug!("line received: {line:?}");

        let Some(parsed) = parse_line(&line) else {
            return false;
        };
        let sample = normalize(&parsed, &self.node_id);

        match self.store.insert_sample(&sample).await {
            Ok(id) => {
                info!(
                    "{} = {} {} [{}] stored as #{id}",
                    sample.metric,
                    sample.value,
                    sample.unit.as_deref().unwrap_or(""),
                    sample.quality
                );
                self.last_values.insert(sample.metric, sample.value);
                true
            }
            Err(e) => {
                error!("could not store {}: {e}", sample.metric);
                false
            }
        }
    }

    /// Run cycles until `count` is reached (forever when `None`) or
    /// `shutdown` turns true. Connects first if needed and disconnects at
    /// the end. Returns the number of samples persisted.
    #[instrument(skip(self, shutdown))]
    pub async fn read_and_store_loop(
        &mut self,
        count: Option<usize>,
        shutdown: &watch::Receiver<bool>,
    ) -> usize {
        if self.source.is_none() && !self.connect() {
            return 0;
        }

        info!("collector loop started");

        let mut cycles = 0;
        let mut saved = 0;
        loop {
            if *shutdown.borrow() {
                info!("interrupt received, stopping collector");
                break;
            }
            if let Some(limit) = count
                && cycles >= limit
            {
                break;
            }

            if self.read_and_store_one().await {
                saved += 1;
            }
            cycles += 1;
        }

        self.disconnect();
        info!("collector loop finished: {saved} samples saved in {cycles} cycles");
        saved
    }

    pub fn last_values(&self) -> &HashMap<String, f64> {
        &self.last_values
    }

    pub async fn store_stats(&self) -> StoreStats {
        self.store.get_stats().await
    }
}
