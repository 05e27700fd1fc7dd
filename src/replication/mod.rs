//! Best-effort replication of durable writes to an external time-series store
//!
//! The [`SampleStore`](crate::storage::SampleStore) hands every committed
//! record to a [`ReplicationSink`] after its transaction commits. Sinks own no
//! state beyond their connection handle and must never report failure back:
//! every method returns `()` and errors end in a log line.
//!
//! ## Backends
//!
//! - **InfluxDB v2** ([`influx::InfluxSink`]): HTTP write API, line protocol
//! - **Disabled**: `InfluxSink::disabled()` acts as a null object

use async_trait::async_trait;

use crate::{DeviceStatus, Sample};

pub mod influx;
pub mod line_protocol;

pub use influx::InfluxSink;

/// Receiver of records that are already durable in the local store
#[async_trait]
pub trait ReplicationSink: Send + Sync {
    /// Forward one accepted sample
    async fn write_sample(&self, sample: &Sample);

    /// Forward a committed batch as a single write
    ///
    /// Malformed records are skipped, never abort the batch.
    async fn write_samples(&self, samples: &[Sample]);

    /// Forward a device-status snapshot
    async fn write_device_status(&self, node_id: &str, status: &DeviceStatus);

    /// Whether writes actually leave the process
    fn is_enabled(&self) -> bool;
}
