//! SQLite sample store
//!
//! ## Features
//!
//! - **Embedded**: no database server, one file per node
//! - **WAL mode**: readers (dashboard, CLI) don't block the collector
//! - **Per-operation connections**: nothing is held open between calls
//! - **Migrations**: schema versioning with sqlx
//!
//! ## Failure contract
//!
//! A failed durable write is returned to the caller. Replication runs only
//! after commit and cannot fail the operation. Batch inserts isolate each
//! row in its own savepoint, so a bad row is skipped instead of aborting the
//! batch.
//!
//! ## Limitations
//!
//! - **Concurrency**: one writer process per node; SQLite's locking does the rest

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow, SqliteSynchronous,
};
use sqlx::{Connection, Row};
use tracing::{debug, error, info, instrument, warn};

use super::error::{StorageError, StorageResult};
use super::schema::{DailyAggregate, DailyAggregateRow, DeviceStatusRow, SampleRow, StoreStats};
use crate::replication::ReplicationSink;
use crate::util::{format_timestamp, parse_timestamp, truncate_timestamp};
use crate::{DeviceStatus, Quality, Sample, Source};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The node's system of record
pub struct SampleStore {
    options: SqliteConnectOptions,
    db_path: PathBuf,
    sink: Arc<dyn ReplicationSink>,
}

impl SampleStore {
    /// Open (and create if needed) the store at `db_path`
    ///
    /// This will:
    /// 1. Create the parent directory and the database file if missing
    /// 2. Run migrations to create tables and indexes
    ///
    /// Accepted writes are forwarded to `sink`.
    #[instrument(skip_all)]
    pub async fn open(
        db_path: impl AsRef<Path>,
        sink: Arc<dyn ReplicationSink>,
    ) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("initializing sample store at: {}", db_path.display());

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let store = Self {
            options,
            db_path,
            sink,
        };

        debug!("running database migrations");
        let mut conn = store.connect().await?;
        MIGRATOR.run(&mut conn).await?;
        conn.close().await?;

        info!(
            "sample store ready, replication {}",
            if store.sink.is_enabled() {
                "enabled"
            } else {
                "disabled"
            }
        );

        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn connect(&self) -> StorageResult<SqliteConnection> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))
    }

    /// Insert one sample and replicate it
    ///
    /// Returns the new row id. A storage failure is returned as-is and nothing
    /// is replicated. The replica receives the sample as stored, i.e. with a
    /// microsecond timestamp.
    #[instrument(skip(self, sample), fields(metric = %sample.metric))]
    pub async fn insert_sample(&self, sample: &Sample) -> StorageResult<i64> {
        let sample = stored_form(sample);
        let id = self
            .write_sample(&sample)
            .await
            .inspect_err(|e| error!("error inserting sample: {e}"))?;

        debug!("sample inserted: id={id}");

        self.sink.write_sample(&sample).await;
        Ok(id)
    }

    async fn write_sample(&self, sample: &Sample) -> StorageResult<i64> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        let id = insert_sample_row(&mut tx, sample).await?;
        tx.commit().await?;
        Ok(after_commit(id, conn.close().await))
    }

    /// Insert many samples in one transaction
    ///
    /// Rows that fail individually are logged and skipped. Only the committed
    /// rows are replicated, in one call. Returns the number of rows persisted.
    #[instrument(skip(self, samples), fields(count = samples.len()))]
    pub async fn insert_samples_batch(&self, samples: &[Sample]) -> StorageResult<usize> {
        if samples.is_empty() {
            return Ok(0);
        }

        let accepted = self
            .write_batch(samples)
            .await
            .inspect_err(|e| error!("error in batch insert: {e}"))?;

        info!("batch inserted: {} of {} samples", accepted.len(), samples.len());

        if !accepted.is_empty() {
            self.sink.write_samples(&accepted).await;
        }
        Ok(accepted.len())
    }

    async fn write_batch(&self, samples: &[Sample]) -> StorageResult<Vec<Sample>> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        let mut accepted = Vec::with_capacity(samples.len());

        for sample in samples.iter().map(stored_form) {
            let mut savepoint = tx.begin().await?;
            match insert_sample_row(&mut savepoint, &sample).await {
                Ok(_) => {
                    savepoint.commit().await?;
                    accepted.push(sample);
                }
                Err(e) => {
                    warn!("error inserting individual sample {:?}: {e}", sample.metric);
                    savepoint.rollback().await?;
                }
            }
        }

        tx.commit().await?;
        Ok(after_commit(accepted, conn.close().await))
    }

    /// Insert a device-status snapshot and replicate it
    ///
    /// A missing or unparseable timestamp is replaced by the current time.
    #[instrument(skip_all, fields(node_id = %node_id))]
    pub async fn insert_device_status(
        &self,
        node_id: &str,
        status: &DeviceStatus,
    ) -> StorageResult<i64> {
        let ts = match status.timestamp.as_deref() {
            Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
                warn!("invalid status timestamp {raw:?}, using current time");
                Utc::now()
            }),
            None => Utc::now(),
        };

        let id = self
            .write_device_status(node_id, &format_timestamp(&ts), status)
            .await
            .inspect_err(|e| error!("error inserting device status: {e}"))?;

        self.sink.write_device_status(node_id, status).await;
        Ok(id)
    }

    async fn write_device_status(
        &self,
        node_id: &str,
        ts: &str,
        status: &DeviceStatus,
    ) -> StorageResult<i64> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO device_status
                (ts, node_id, status, cpu_pct, ram_pct, disk_pct, temp_c, uptime_s)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts)
        .bind(node_id)
        .bind(&status.status)
        .bind(status.cpu_pct)
        .bind(status.ram_pct)
        .bind(status.disk_pct)
        .bind(status.temp_c)
        .bind(status.uptime_s)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        Ok(after_commit(id, conn.close().await))
    }

    /// Most recent samples first, optionally for one metric only
    #[instrument(skip(self))]
    pub async fn get_samples(
        &self,
        metric: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<SampleRow>> {
        let mut conn = self.connect().await?;

        let rows = match metric {
            Some(metric) => {
                sqlx::query(
                    r#"
                    SELECT id, ts, node_id, source, metric, value, unit, quality
                    FROM sensor_samples
                    WHERE metric = ?
                    ORDER BY ts DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(metric)
                .bind(limit as i64)
                .fetch_all(&mut conn)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, ts, node_id, source, metric, value, unit, quality
                    FROM sensor_samples
                    ORDER BY ts DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(&mut conn)
                .await?
            }
        };
        conn.close().await?;

        let samples = rows
            .iter()
            .map(sample_from_row)
            .collect::<StorageResult<Vec<_>>>()?;
        debug!("query returned {} samples", samples.len());
        Ok(samples)
    }

    /// Samples with `start <= ts <= end`, oldest first
    #[instrument(skip(self))]
    pub async fn get_samples_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        metric: Option<&str>,
    ) -> StorageResult<Vec<SampleRow>> {
        let start = format_timestamp(&start);
        let end = format_timestamp(&end);

        let mut conn = self.connect().await?;

        let rows = match metric {
            Some(metric) => {
                sqlx::query(
                    r#"
                    SELECT id, ts, node_id, source, metric, value, unit, quality
                    FROM sensor_samples
                    WHERE ts BETWEEN ? AND ? AND metric = ?
                    ORDER BY ts ASC, id ASC
                    "#,
                )
                .bind(&start)
                .bind(&end)
                .bind(metric)
                .fetch_all(&mut conn)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, ts, node_id, source, metric, value, unit, quality
                    FROM sensor_samples
                    WHERE ts BETWEEN ? AND ?
                    ORDER BY ts ASC, id ASC
                    "#,
                )
                .bind(&start)
                .bind(&end)
                .fetch_all(&mut conn)
                .await?
            }
        };
        conn.close().await?;

        rows.iter().map(sample_from_row).collect()
    }

    /// Compute and persist the min/max/avg/count of one metric on one node
    /// for one UTC day
    ///
    /// Returns `Ok(None)` without writing anything when the day has no
    /// samples. Every successful call appends a new aggregate row.
    #[instrument(skip(self))]
    pub async fn compute_daily_aggregate(
        &self,
        date: NaiveDate,
        metric: &str,
        node_id: &str,
    ) -> StorageResult<Option<DailyAggregate>> {
        let date_str = date.format(DATE_FORMAT).to_string();

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT value, unit FROM sensor_samples
            WHERE substr(ts, 1, 10) = ? AND metric = ? AND node_id = ?
            ORDER BY ts ASC, id ASC
            "#,
        )
        .bind(&date_str)
        .bind(metric)
        .bind(node_id)
        .fetch_all(&mut *tx)
        .await?;

        let values = rows
            .iter()
            .map(|row| row.try_get::<f64, _>("value"))
            .collect::<Result<Vec<_>, _>>()?;
        let unit = match rows.first() {
            Some(row) => row.try_get::<Option<String>, _>("unit")?,
            None => None,
        };

        let Some(aggregate) = DailyAggregate::from_values(date, node_id, metric, &values, unit)
        else {
            warn!("no samples for {metric} on {date_str}");
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO daily_aggregates
                (date, node_id, metric, value_min, value_max, value_avg, value_count, unit)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&date_str)
        .bind(node_id)
        .bind(metric)
        .bind(aggregate.value_min)
        .bind(aggregate.value_max)
        .bind(aggregate.value_avg)
        .bind(aggregate.value_count)
        .bind(aggregate.unit.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        after_commit((), conn.close().await);

        info!(
            "aggregate computed for {metric} on {date_str}: min={} max={} avg={} count={}",
            aggregate.value_min, aggregate.value_max, aggregate.value_avg, aggregate.value_count
        );
        Ok(Some(aggregate))
    }

    /// Persisted aggregates, most recent day first
    #[instrument(skip(self))]
    pub async fn get_daily_aggregates(
        &self,
        metric: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<DailyAggregateRow>> {
        let mut conn = self.connect().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, date, node_id, metric, value_min, value_max, value_avg,
                   value_count, unit, created_at
            FROM daily_aggregates
            WHERE ? IS NULL OR metric = ?
            ORDER BY date DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(metric)
        .bind(metric)
        .bind(limit as i64)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        rows.iter().map(aggregate_from_row).collect()
    }

    /// Device-status snapshots, most recent first
    #[instrument(skip(self))]
    pub async fn get_device_status(
        &self,
        node_id: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<DeviceStatusRow>> {
        let mut conn = self.connect().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, ts, node_id, status, cpu_pct, ram_pct, disk_pct, temp_c, uptime_s
            FROM device_status
            WHERE ? IS NULL OR node_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(node_id)
        .bind(node_id)
        .bind(limit as i64)
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        rows.iter().map(status_from_row).collect()
    }

    /// Summary of the sample table; zeroed when the store can't be read
    #[instrument(skip(self))]
    pub async fn get_stats(&self) -> StoreStats {
        match self.read_stats().await {
            Ok(stats) => stats,
            Err(e) => {
                error!("error reading store statistics: {e}");
                StoreStats::default()
            }
        }
    }

    async fn read_stats(&self) -> StorageResult<StoreStats> {
        let mut conn = self.connect().await?;

        let (total_samples, distinct_metrics, earliest, latest): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(DISTINCT metric), MIN(ts), MAX(ts) FROM sensor_samples",
        )
        .fetch_one(&mut conn)
        .await?;
        conn.close().await?;

        let store_size_bytes = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total_samples,
            distinct_metrics,
            earliest_timestamp: earliest,
            latest_timestamp: latest,
            store_size_bytes,
        })
    }

    /// Remove samples older than `days` days; returns the number removed, 0
    /// on failure
    #[instrument(skip(self))]
    pub async fn delete_older_than(&self, days: u32) -> u64 {
        let Some(cutoff) = TimeDelta::try_days(i64::from(days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            warn!("retention of {days} days reaches before the earliest instant, nothing to delete");
            return 0;
        };
        self.delete_before(cutoff).await
    }

    /// Remove samples with `ts` strictly before `cutoff`; 0 on failure
    #[instrument(skip_all, fields(cutoff = %cutoff))]
    pub async fn delete_before(&self, cutoff: DateTime<Utc>) -> u64 {
        match self.prune(&format_timestamp(&cutoff)).await {
            Ok(deleted) => {
                info!("deleted {deleted} samples older than {cutoff}");
                deleted
            }
            Err(e) => {
                error!("error deleting old samples: {e}");
                0
            }
        }
    }

    async fn prune(&self, cutoff: &str) -> StorageResult<u64> {
        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;

        let deleted = sqlx::query("DELETE FROM sensor_samples WHERE ts < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(after_commit(deleted, conn.close().await))
    }
}

/// The sample as it reads back from the store.
fn stored_form(sample: &Sample) -> Sample {
    Sample {
        timestamp: truncate_timestamp(sample.timestamp),
        ..sample.clone()
    }
}

/// Once a transaction has committed the data is durable, so a failure to close
/// the connection is only worth a warning.
fn after_commit<T>(value: T, close: Result<(), sqlx::Error>) -> T {
    if let Err(e) = close {
        warn!("error closing connection after commit: {e}");
    }
    value
}

async fn insert_sample_row(conn: &mut SqliteConnection, sample: &Sample) -> StorageResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sensor_samples
            (ts, node_id, source, metric, value, unit, quality)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(format_timestamp(&sample.timestamp))
    .bind(&sample.node_id)
    .bind(sample.source.as_str())
    .bind(&sample.metric)
    .bind(sample.value)
    .bind(sample.unit.as_deref())
    .bind(sample.quality.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

fn sample_from_row(row: &SqliteRow) -> StorageResult<SampleRow> {
    let ts: String = row.try_get("ts")?;
    let timestamp = parse_timestamp(&ts)
        .ok_or_else(|| StorageError::SerializationError(format!("invalid timestamp {ts:?}")))?;
    let source: String = row.try_get("source")?;
    let quality: Option<String> = row.try_get("quality")?;

    Ok(SampleRow {
        id: row.try_get("id")?,
        sample: Sample {
            timestamp,
            node_id: row.try_get("node_id")?,
            source: Source::from_tag(&source),
            metric: row.try_get("metric")?,
            value: row.try_get("value")?,
            unit: row.try_get("unit")?,
            quality: quality.as_deref().map(Quality::from_tag).unwrap_or_default(),
        },
    })
}

fn aggregate_from_row(row: &SqliteRow) -> StorageResult<DailyAggregateRow> {
    let date: String = row.try_get("date")?;
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| StorageError::SerializationError(format!("invalid date {date:?}: {e}")))?;

    Ok(DailyAggregateRow {
        id: row.try_get("id")?,
        aggregate: DailyAggregate {
            date,
            node_id: row.try_get("node_id")?,
            metric: row.try_get("metric")?,
            value_min: row.try_get("value_min")?,
            value_max: row.try_get("value_max")?,
            value_avg: row.try_get("value_avg")?,
            value_count: row.try_get("value_count")?,
            unit: row.try_get("unit")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

fn status_from_row(row: &SqliteRow) -> StorageResult<DeviceStatusRow> {
    Ok(DeviceStatusRow {
        id: row.try_get("id")?,
        node_id: row.try_get("node_id")?,
        status: DeviceStatus {
            timestamp: row.try_get("ts")?,
            status: row.try_get("status")?,
            cpu_pct: row.try_get("cpu_pct")?,
            ram_pct: row.try_get("ram_pct")?,
            disk_pct: row.try_get("disk_pct")?,
            temp_c: row.try_get("temp_c")?,
            uptime_s: row.try_get("uptime_s")?,
        },
    })
}
