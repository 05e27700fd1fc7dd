use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use naira_edge::{
    collector::SerialCollector,
    config::{Config, read_config_file},
    monitors,
    replication::InfluxSink,
    storage::SampleStore,
};
use tokio::sync::watch;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(about = "Sensor acquisition and storage for a NAIRA edge node")]
struct Args {
    /// Config file (JSON); defaults plus environment when omitted
    #[arg(short)]
    file: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Read the serial device and store every reading
    Collect {
        #[arg(long)]
        port: Option<String>,

        #[arg(long)]
        baudrate: Option<u32>,

        #[arg(long)]
        node_id: Option<String>,

        /// Number of read cycles; runs until Ctrl-C when omitted
        #[arg(long)]
        count: Option<usize>,
    },

    /// Print store statistics
    Stats,

    /// Compute and persist the daily summary of one metric
    Aggregate {
        /// Day to summarize (YYYY-MM-DD, UTC); yesterday when omitted
        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        metric: String,

        #[arg(long)]
        node_id: Option<String>,
    },

    /// Delete samples older than the retention window
    Prune {
        #[arg(long)]
        days: Option<u32>,
    },

    /// Snapshot the health of this device and store it
    Status,
}

fn init(level: LevelFilter) {
    let filter = filter::Targets::new().with_targets(vec![
        ("naira_edge", level),
        ("naira_collector", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let mut config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    let sink = Arc::new(InfluxSink::new(&config.replication));
    let store = Arc::new(
        SampleStore::open(&config.storage.path, sink)
            .await
            .context("failed to open sample store")?,
    );

    match args.command {
        Command::Collect {
            port,
            baudrate,
            node_id,
            count,
        } => {
            if let Some(port) = port {
                config.serial.port = port;
            }
            if let Some(baudrate) = baudrate {
                config.serial.baudrate = baudrate;
            }
            if let Some(node_id) = node_id {
                config.node_id = node_id;
            }
            collect(config, store, count).await
        }
        Command::Stats => {
            let stats = store.get_stats().await;
            println!("store:     {}", store.db_path().display());
            println!("samples:   {}", stats.total_samples);
            println!("metrics:   {}", stats.distinct_metrics);
            println!(
                "earliest:  {}",
                stats.earliest_timestamp.as_deref().unwrap_or("-")
            );
            println!(
                "latest:    {}",
                stats.latest_timestamp.as_deref().unwrap_or("-")
            );
            println!("size:      {:.2} MB", stats.store_size_mb());
            Ok(())
        }
        Command::Aggregate {
            date,
            metric,
            node_id,
        } => {
            let date = date.unwrap_or_else(|| (Utc::now() - Duration::days(1)).date_naive());
            let node_id = node_id.unwrap_or(config.node_id);
            match store
                .compute_daily_aggregate(date, &metric, &node_id)
                .await?
            {
                Some(aggregate) => println!("{}", serde_json::to_string_pretty(&aggregate)?),
                None => println!("no samples for {metric} on {date}"),
            }
            Ok(())
        }
        Command::Prune { days } => {
            let days = days.unwrap_or(config.storage.retention_days);
            let deleted = store.delete_older_than(days).await;
            println!("deleted {deleted} samples older than {days} days");
            Ok(())
        }
        Command::Status => {
            let status = tokio::task::spawn_blocking(monitors::snapshot)
                .await
                .context("device snapshot task failed")?;
            let id = store.insert_device_status(&config.node_id, &status).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            info!("device status stored as #{id}");
            Ok(())
        }
    }
}

async fn collect(config: Config, store: Arc<SampleStore>, count: Option<usize>) -> anyhow::Result<()> {
    let pruned = store.delete_older_than(config.storage.retention_days).await;
    if pruned > 0 {
        info!(
            "pruned {pruned} samples older than {} days",
            config.storage.retention_days
        );
    }

    let port = config.serial.port.clone();
    let mut collector = SerialCollector::new(config.serial, config.node_id, store);
    if !collector.connect() {
        anyhow::bail!("could not open serial port {port}");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("could not listen for Ctrl-C: {e}");
            return;
        }
        warn!("Ctrl-C received, finishing current cycle");
        let _ = shutdown_tx.send(true);
    });

    let saved = collector.read_and_store_loop(count, &shutdown_rx).await;

    println!("{saved} samples saved from {}", collector.node_id());
    let mut last_values: Vec<_> = collector.last_values().iter().collect();
    last_values.sort_by(|a, b| a.0.cmp(b.0));
    for (metric, value) in last_values {
        println!("  {metric}: {value}");
    }

    let stats = collector.store_stats().await;
    println!(
        "store: {} samples, {:.2} MB",
        stats.total_samples,
        stats.store_size_mb()
    );
    Ok(())
}
