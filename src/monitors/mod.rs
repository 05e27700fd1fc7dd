//! Health of the node the collector runs on

pub mod device;

pub use device::{HealthLevel, Thresholds, classify, snapshot};
