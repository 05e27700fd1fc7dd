//! Durable storage of samples, device status and daily aggregates
//!
//! ## Design
//!
//! - **System of record**: the local SQLite file owns the schema
//! - **Transactional**: every public operation runs in one transaction on a
//!   connection opened for that operation only
//! - **Replication after commit**: committed records are handed to a
//!   [`ReplicationSink`](crate::replication::ReplicationSink); its outcome never
//!   changes the result of the store operation
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use naira_edge::replication::InfluxSink;
//! use naira_edge::storage::SampleStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SampleStore::open("./data/naira_sensors.db", Arc::new(InfluxSink::disabled())).await?;
//!     println!("{:?}", store.get_stats().await);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod schema;
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use schema::{DailyAggregate, DailyAggregateRow, DeviceStatusRow, SampleRow, StoreStats};
pub use sqlite::SampleStore;
