//! silt - stream JSON from Kafka topics into ClickHouse tables
//!
//! # Usage
//!
//! ```bash
//! silt --config configs/silt.toml
//! silt --config configs/silt.toml --log-level debug
//! ```
//!
//! One process runs every task in the config file. Tasks share the parsing
//! and writing pools; each owns its consumer group and writer. A permanent
//! write or schema failure stops the process with a non-zero status so an
//! external supervisor can restart it from the last committed offsets.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use silt_config::{Config, LogFormat};
use silt_input::KafkaInput;
use silt_output::ClickHouseWriter;
use silt_pipeline::TaskService;
use silt_util::WorkerPool;

/// silt - Kafka → ClickHouse stream sink
#[derive(Parser, Debug)]
#[command(name = "silt")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "configs/silt.toml")]
    config: std::path::PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or_else(|| config.log.level.as_str());
    init_logging(level, config.log.format)?;

    let parsing_pool = Arc::new(WorkerPool::new(
        "parsing",
        config.global.parsing_workers,
        config.global.pool_queue_depth,
    ));
    let writing_pool = Arc::new(WorkerPool::new(
        "writing",
        config.global.writing_workers,
        config.global.pool_queue_depth,
    ));
    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();

    let mut services = Vec::with_capacity(config.tasks.len());
    for (name, task_cfg) in &config.tasks {
        let task_cfg = Arc::new(task_cfg.clone());
        let kafka_cfg = config.kafka_for(&task_cfg);
        let ch_cfg = config.clickhouse_for(&task_cfg).clone();

        let inputer = Arc::new(KafkaInput::new(
            kafka_cfg,
            name,
            &task_cfg.topic,
            &task_cfg.consumer_group,
        ));
        let writer = Arc::new(ClickHouseWriter::new(
            name,
            Arc::clone(&task_cfg),
            ch_cfg,
            Arc::clone(&writing_pool),
            fatal_tx.clone(),
        ));
        let service = TaskService::new(
            name,
            task_cfg,
            inputer,
            writer,
            Arc::clone(&parsing_pool),
            fatal_tx.clone(),
            shutdown.clone(),
        );

        service
            .init()
            .await
            .with_context(|| format!("initialising task {name}"))?;
        service.spawn_run()?;
        services.push(service);
    }
    tracing::info!(tasks = services.len(), "silt started");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            Ok(())
        }
        fatal = fatal_rx.recv() => match fatal {
            Some(fatal) => Err(anyhow!("fatal: {fatal}")),
            None => Ok(()),
        },
    };

    for service in &services {
        service.notify_stop();
    }
    for service in &services {
        service.stop().await;
    }
    shutdown.cancel();
    parsing_pool.shutdown();
    writing_pool.shutdown();

    tracing::info!("silt stopped");
    outcome
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow!("invalid log level: {e}"))?;

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}
