//! Periodic archiver
//!
//! Samples the telemetry snapshot on a fixed interval and hands history
//! records, plus alerts for Warning/Danger states, to a pluggable
//! [`ArchiveSink`]:
//! - `JsonLinesArchive`: appends to `readings.jsonl` / `alerts.jsonl`
//! - `InMemoryArchive`: bounded in-memory store for tests and dry runs
//!
//! Snapshots taken while the sensor is unplugged are skipped, so a stale
//! last-known Danger state does not produce an alert every interval.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::telemetry::TelemetrySink;
use crate::types::{AiCommand, LatestSnapshot, RiskLabel, RiskStatus, Trend};

const READINGS_FILE: &str = "readings.jsonl";
const ALERTS_FILE: &str = "alerts.jsonl";

// ============================================================================
// Records
// ============================================================================

/// One history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub recorded_at: DateTime<Utc>,
    pub mq2_voltage: f64,
    pub mq135_voltage: f64,
    pub mq2_gas: f64,
    pub mq135_air: f64,
    pub risk_score: u8,
    pub status: RiskStatus,
    pub prediction: RiskLabel,
    pub confidence: f64,
    pub ai_command: AiCommand,
    pub trend: Option<Trend>,
    pub time_to_critical: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub created_at: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
    pub resolved: bool,
}

/// Derive the history record and optional alert for one snapshot.
///
/// `None` while disconnected or before the first classified reading.
pub fn derive_records(snap: &LatestSnapshot) -> Option<(ArchiveRecord, Option<AlertRecord>)> {
    if !snap.sensor_connected() {
        return None;
    }
    let classification = snap.classification?;
    let reading = snap.reading?;
    let now = Utc::now();

    let record = ArchiveRecord {
        recorded_at: now,
        mq2_voltage: reading.mq2_voltage,
        mq135_voltage: reading.mq135_voltage,
        mq2_gas: snap.values.mq2_gas,
        mq135_air: snap.values.mq135_air,
        risk_score: classification.risk_score,
        status: classification.status,
        prediction: classification.prediction,
        confidence: classification.confidence,
        ai_command: classification.ai_command,
        trend: snap.forecast.map(|f| f.trend),
        time_to_critical: snap.time_to_critical(),
    };

    let alert = classification.status.is_alerting().then(|| AlertRecord {
        created_at: now,
        severity: if classification.status == RiskStatus::Danger {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        },
        message: alert_message(&record),
        resolved: false,
    });

    Some((record, alert))
}

/// e.g. `Danger Detected! Score: 95% (MQ2: 2.50V|875ppm, MQ135: 0.80V|280ppm) [AI_CRITICAL]`
pub fn alert_message(record: &ArchiveRecord) -> String {
    format!(
        "{} Detected! Score: {}% (MQ2: {:.2}V|{:.0}ppm, MQ135: {:.2}V|{:.0}ppm) [{}]",
        record.status,
        record.risk_score,
        record.mq2_voltage,
        record.mq2_gas,
        record.mq135_voltage,
        record.mq135_air,
        record.ai_command,
    )
}

// ============================================================================
// Sinks
// ============================================================================

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("archive storage error: {0}")]
    Storage(String),
}

/// Destination for archive output. Must be shareable across tasks.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    async fn store_record(&self, record: &ArchiveRecord) -> Result<(), ArchiveError>;

    async fn store_alert(&self, alert: &AlertRecord) -> Result<(), ArchiveError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Appends one JSON document per line.
pub struct JsonLinesArchive {
    directory: PathBuf,
}

impl JsonLinesArchive {
    /// Create the directory if needed.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| ArchiveError::Io {
                path: directory.clone(),
                source,
            })?;
        Ok(Self { directory })
    }

    pub fn readings_path(&self) -> PathBuf {
        self.directory.join(READINGS_FILE)
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.directory.join(ALERTS_FILE)
    }

    async fn append<T: Serialize + Sync>(path: &Path, value: &T) -> Result<(), ArchiveError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let io_err = |source| ArchiveError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(io_err)?;
        file.write_all(&line).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for JsonLinesArchive {
    async fn store_record(&self, record: &ArchiveRecord) -> Result<(), ArchiveError> {
        Self::append(&self.readings_path(), record).await
    }

    async fn store_alert(&self, alert: &AlertRecord) -> Result<(), ArchiveError> {
        Self::append(&self.alerts_path(), alert).await
    }

    fn backend_name(&self) -> &'static str {
        "jsonl"
    }
}

/// Bounded in-memory archive. Not durable.
pub struct InMemoryArchive {
    records: RwLock<Vec<ArchiveRecord>>,
    alerts: RwLock<Vec<AlertRecord>>,
    max_entries: usize,
}

impl Default for InMemoryArchive {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl InMemoryArchive {
    pub fn new(max_entries: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            alerts: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn alerts(&self) -> Vec<AlertRecord> {
        self.alerts.read().map(|a| a.clone()).unwrap_or_default()
    }

    fn push_bounded<T: Clone>(store: &RwLock<Vec<T>>, value: &T, max: usize) -> Result<(), ArchiveError> {
        let mut store = store
            .write()
            .map_err(|e| ArchiveError::Storage(e.to_string()))?;
        if store.len() >= max {
            store.remove(0);
        }
        store.push(value.clone());
        Ok(())
    }
}

#[async_trait]
impl ArchiveSink for InMemoryArchive {
    async fn store_record(&self, record: &ArchiveRecord) -> Result<(), ArchiveError> {
        Self::push_bounded(&self.records, record, self.max_entries)
    }

    async fn store_alert(&self, alert: &AlertRecord) -> Result<(), ArchiveError> {
        Self::push_bounded(&self.alerts, alert, self.max_entries)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Loop
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiverStats {
    pub records_written: u64,
    pub alerts_written: u64,
    pub skipped: u64,
    pub failures: u64,
}

pub struct Archiver {
    telemetry: Arc<TelemetrySink>,
    archive: Arc<dyn ArchiveSink>,
    interval: Duration,
    stats: ArchiverStats,
}

impl Archiver {
    pub fn new(telemetry: Arc<TelemetrySink>, archive: Arc<dyn ArchiveSink>, interval: Duration) -> Self {
        Self {
            telemetry,
            archive,
            interval,
            stats: ArchiverStats::default(),
        }
    }

    /// Archive the current snapshot once. Sink errors are logged and counted.
    pub async fn tick(&mut self) {
        let snap = self.telemetry.snapshot();
        let Some((record, alert)) = derive_records(&snap) else {
            self.stats.skipped += 1;
            debug!(connected = snap.sensor_connected(), "Archive tick skipped");
            return;
        };

        match self.archive.store_record(&record).await {
            Ok(()) => self.stats.records_written += 1,
            Err(e) => {
                self.stats.failures += 1;
                warn!(backend = self.archive.backend_name(), error = %e, "Failed to archive reading");
            }
        }

        if let Some(alert) = alert {
            match self.archive.store_alert(&alert).await {
                Ok(()) => {
                    self.stats.alerts_written += 1;
                    info!(severity = ?alert.severity, message = %alert.message, "Alert archived");
                }
                Err(e) => {
                    self.stats.failures += 1;
                    warn!(backend = self.archive.backend_name(), error = %e, "Failed to archive alert");
                }
            }
        }
    }

    /// Tick every interval until cancelled. The first tick fires one interval in.
    pub async fn run(mut self, cancel: CancellationToken) -> ArchiverStats {
        info!(
            backend = self.archive.backend_name(),
            interval_secs = self.interval.as_secs(),
            "Archiver started"
        );
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(
                        records = self.stats.records_written,
                        alerts = self.stats.alerts_written,
                        "Archiver shutting down"
                    );
                    return self.stats;
                }
                _ = ticker.tick() => self.tick().await,
            }
        }
    }

    pub fn stats(&self) -> ArchiverStats {
        self.stats
    }
}
