use std::path::Path;

use sysinfo::{Components, Disks, System};
use tracing::{debug, instrument};

use crate::DeviceStatus;
use crate::util::format_timestamp;

/// Warning and critical limits for one resource, both inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

pub const CPU_THRESHOLDS: Thresholds = Thresholds {
    warning: 70.0,
    critical: 90.0,
};

pub const RAM_THRESHOLDS: Thresholds = Thresholds {
    warning: 75.0,
    critical: 90.0,
};

pub const DISK_THRESHOLDS: Thresholds = Thresholds {
    warning: 75.0,
    critical: 90.0,
};

pub const TEMP_THRESHOLDS: Thresholds = Thresholds {
    warning: 65.0,
    critical: 75.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthLevel {
    Ok,
    Warning,
    Error,
}

impl HealthLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthLevel::Ok => "ok",
            HealthLevel::Warning => "warning",
            HealthLevel::Error => "error",
        }
    }

    fn evaluate(value: Option<f64>, thresholds: Thresholds) -> HealthLevel {
        match value {
            Some(v) if v >= thresholds.critical => HealthLevel::Error,
            Some(v) if v >= thresholds.warning => HealthLevel::Warning,
            _ => HealthLevel::Ok,
        }
    }
}

/// Worst level over all present metrics; absent metrics count as ok.
pub fn classify(status: &DeviceStatus) -> HealthLevel {
    [
        HealthLevel::evaluate(status.cpu_pct, CPU_THRESHOLDS),
        HealthLevel::evaluate(status.ram_pct, RAM_THRESHOLDS),
        HealthLevel::evaluate(status.disk_pct, DISK_THRESHOLDS),
        HealthLevel::evaluate(status.temp_c, TEMP_THRESHOLDS),
    ]
    .into_iter()
    .max()
    .unwrap_or(HealthLevel::Ok)
}

/// Sample the host and build a classified status snapshot.
///
/// Blocks for [`sysinfo::MINIMUM_CPU_UPDATE_INTERVAL`] to get a meaningful
/// CPU reading; call it from the blocking pool in async code.
#[instrument]
pub fn snapshot() -> DeviceStatus {
    let mut sys = System::new_all();
    sys.refresh_all();
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu_usage();

    let ram_pct = match sys.total_memory() {
        0 => None,
        total => Some(sys.used_memory() as f64 / total as f64 * 100.0),
    };

    let disks = Disks::new_with_refreshed_list();
    let disk_pct = disks
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().next())
        .filter(|disk| disk.total_space() > 0)
        .map(|disk| {
            let used = disk.total_space().saturating_sub(disk.available_space());
            used as f64 / disk.total_space() as f64 * 100.0
        });

    let components = Components::new_with_refreshed_list();
    let temperatures: Vec<f64> = components
        .iter()
        .filter_map(|component| component.temperature())
        .filter(|t| t.is_finite())
        .map(f64::from)
        .collect();
    let temp_c = match temperatures.len() {
        0 => None,
        n => Some(temperatures.iter().sum::<f64>() / n as f64),
    };

    let mut status = DeviceStatus {
        timestamp: Some(format_timestamp(&chrono::Utc::now())),
        cpu_pct: Some(f64::from(sys.global_cpu_usage())),
        ram_pct,
        disk_pct,
        temp_c,
        uptime_s: Some(System::uptime() as f64),
        ..DeviceStatus::default()
    };
    status.status = classify(&status).as_str().to_string();

    debug!("device snapshot: {status:?}");
    status
}
