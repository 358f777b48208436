//! Gas Sentinel - serial gas/smoke risk engine
//!
//! # Usage
//!
//! ```bash
//! # Real board
//! gas-sentinel --port /dev/ttyUSB0 --baud 9600
//!
//! # No hardware: synthetic 10 Hz board with periodic gas events
//! gas-sentinel --simulate
//! ```
//!
//! # Environment Variables
//!
//! - `GAS_SENTINEL_CONFIG`: path to a TOML config file (default: ./gas_sentinel.toml)
//! - `GAS_SENTINEL_PORT` / `GAS_SENTINEL_BAUD`: serial overrides
//! - `GAS_SENTINEL_MODEL`: path to the risk model artifact
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gas_sentinel::acquisition::{
    ConnectionSupervisor, PortOpener, SerialPortOpener, SimulatedOpener, SupervisorSettings,
};
use gas_sentinel::config::SentinelConfig;
use gas_sentinel::ml_engine::{load_model, RiskClassifier};
use gas_sentinel::pipeline::{
    ArchiveSink, Archiver, InMemoryArchive, JsonLinesArchive, ReadingProcessor, TelemetrySink,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "gas-sentinel")]
#[command(about = "MQ-2/MQ-135 gas and smoke risk engine")]
#[command(version)]
struct CliArgs {
    /// Serial port (overrides [serial].port)
    #[arg(short, long, env = "GAS_SENTINEL_PORT")]
    port: Option<String>,

    /// Baud rate (overrides [serial].baud_rate)
    #[arg(short, long, env = "GAS_SENTINEL_BAUD")]
    baud: Option<u32>,

    /// Config file path (skips the standard search order)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Risk model artifact (overrides [model].path)
    #[arg(short, long, value_name = "FILE")]
    model: Option<PathBuf>,

    /// Use a simulated sensor board instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Seed for the simulated board
    #[arg(long, requires = "simulate")]
    seed: Option<u64>,

    /// Keep archive records in memory instead of writing JSON lines
    #[arg(long)]
    no_archive_files: bool,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    SerialSupervisor,
    Archiver,
    SnapshotLogger,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::SerialSupervisor => write!(f, "SerialSupervisor"),
            TaskName::Archiver => write!(f, "Archiver"),
            TaskName::SnapshotLogger => write!(f, "SnapshotLogger"),
        }
    }
}

async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("Supervisor: all tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("Supervisor: shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("Supervisor: task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("Supervisor: task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("Supervisor: task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("Supervisor: all tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let tasks observe cancellation and publish their final state
    while let Some(result) = task_set.join_next().await {
        if let Ok(Ok(task_name)) = result {
            info!("Supervisor: task {} stopped", task_name);
        }
    }

    Ok(())
}

// ============================================================================
// Setup
// ============================================================================

fn load_config(args: &CliArgs) -> Result<SentinelConfig> {
    let mut config = match &args.config {
        Some(path) => SentinelConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => SentinelConfig::load(),
    };

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(model) = &args.model {
        config.model.path = Some(model.clone());
    }

    config.validate().context("Invalid configuration after CLI overrides")?;
    Ok(config)
}

async fn build_archive(config: &SentinelConfig, in_memory: bool) -> Result<Arc<dyn ArchiveSink>> {
    if in_memory {
        return Ok(Arc::new(InMemoryArchive::default()));
    }
    let archive = JsonLinesArchive::open(&config.archive.directory)
        .await
        .with_context(|| {
            format!(
                "Failed to prepare archive directory {}",
                config.archive.directory.display()
            )
        })?;
    Ok(Arc::new(archive))
}

/// Periodic one-line status for operators watching the console.
async fn log_snapshots(telemetry: Arc<TelemetrySink>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let snap = telemetry.snapshot();
                match snap.classification {
                    Some(c) => info!(
                        connected = snap.sensor_connected(),
                        mq2 = snap.values.mq2_voltage,
                        mq135 = snap.values.mq135_voltage,
                        prediction = %c.prediction,
                        score = c.risk_score,
                        status = %c.status,
                        command = %c.ai_command,
                        forecast = %snap.time_to_critical(),
                        "Status"
                    ),
                    None => info!(
                        connected = snap.sensor_connected(),
                        raw = %snap.raw_log,
                        "Status: no classified reading yet"
                    ),
                }
            }
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    info!("Gas Sentinel starting");
    info!(
        port = %config.serial.port,
        baud_rate = config.serial.baud_rate,
        simulate = args.simulate,
        window = config.classifier.window_size,
        confidence_threshold = config.classifier.confidence_threshold,
        "Configuration loaded"
    );

    // Model is optional: thresholds cover its absence
    let loaded = load_model(config.model.path.as_deref());
    let classifier = RiskClassifier::new(loaded, config.classifier.confidence_threshold);
    if !classifier.has_model() {
        warn!("Running on voltage thresholds only");
    }

    let telemetry = Arc::new(TelemetrySink::new());
    let processor = ReadingProcessor::new(Arc::clone(&telemetry), classifier, &config.classifier);

    let opener: Arc<dyn PortOpener> = if args.simulate {
        let interval = std::time::Duration::from_secs_f64(config.classifier.sample_interval_secs);
        Arc::new(SimulatedOpener::new(interval, args.seed))
    } else {
        Arc::new(SerialPortOpener::new(config.serial.read_timeout()))
    };

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: Serial supervisor (sole writer of the telemetry snapshot)
    let supervisor = ConnectionSupervisor::new(
        SupervisorSettings::from_config(&config),
        opener,
        processor,
        cancel_token.clone(),
    );
    task_set.spawn(async move {
        let stats = supervisor.run().await;
        info!(
            attempts = stats.connect_attempts,
            lines = stats.lines_processed,
            commands = stats.commands_sent,
            "[SerialSupervisor] Finished"
        );
        Ok(TaskName::SerialSupervisor)
    });

    // Task 2: Archiver
    if config.archive.enabled {
        let archive = build_archive(&config, args.no_archive_files).await?;
        let archiver = Archiver::new(Arc::clone(&telemetry), archive, config.archive.interval());
        let archive_cancel = cancel_token.clone();
        task_set.spawn(async move {
            let stats = archiver.run(archive_cancel).await;
            info!(
                records = stats.records_written,
                alerts = stats.alerts_written,
                failures = stats.failures,
                "[Archiver] Finished"
            );
            Ok(TaskName::Archiver)
        });
    } else {
        info!("Archiver disabled");
    }

    // Task 3: Console status
    let log_cancel = cancel_token.clone();
    let log_telemetry = Arc::clone(&telemetry);
    task_set.spawn(async move {
        log_snapshots(log_telemetry, log_cancel).await;
        Ok(TaskName::SnapshotLogger)
    });

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("Gas Sentinel shutdown complete");
    Ok(())
}
