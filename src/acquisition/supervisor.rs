//! Serial connection supervisor
//!
//! Owns the device link for the life of the process:
//!
//! ```text
//! Disconnected ──open──▶ Connecting ──ok──▶ Connected ──I/O error──▶ Disconnected
//!       ▲                    │                                          │
//!       └──connect_retry─────┘ (open failed)          drop_backoff ─────┘
//! ```
//!
//! While connected it polls the driver, drains every buffered line keeping
//! only the newest, feeds that line to the [`ReadingProcessor`] and writes
//! back any command that the processor's edge trigger lets through.
//!
//! All driver calls are blocking and run on `spawn_blocking`; the link mutex
//! is only ever locked inside those closures.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::serial_link::{PortOpener, SerialError, SerialLink};
use crate::config::SentinelConfig;
use crate::pipeline::ReadingProcessor;
use crate::types::{AiCommand, ConnectionState};

/// Upper bound on lines consumed by a single drain.
const MAX_DRAIN_LINES: usize = 4096;

type SharedLink = Arc<Mutex<Box<dyn SerialLink>>>;

/// Timing and addressing for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub port: String,
    pub baud_rate: u32,
    pub idle_poll: Duration,
    pub connect_retry: Duration,
    pub drop_backoff: Duration,
}

impl SupervisorSettings {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            port: config.serial.port.clone(),
            baud_rate: config.serial.baud_rate,
            idle_poll: config.serial.idle_poll(),
            connect_retry: config.reconnect.connect_retry(),
            drop_backoff: config.reconnect.drop_backoff(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub link_drops: u64,
    pub lines_processed: u64,
    pub commands_sent: u64,
}

/// Why a connected session ended.
enum SessionEnd {
    Cancelled,
    Dropped(SerialError),
}

pub struct ConnectionSupervisor {
    settings: SupervisorSettings,
    opener: Arc<dyn PortOpener>,
    processor: ReadingProcessor,
    cancel: CancellationToken,
    stats: SupervisorStats,
}

impl ConnectionSupervisor {
    pub fn new(
        settings: SupervisorSettings,
        opener: Arc<dyn PortOpener>,
        processor: ReadingProcessor,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            opener,
            processor,
            cancel,
            stats: SupervisorStats::default(),
        }
    }

    /// Run until cancelled. Never returns early on I/O errors.
    pub async fn run(mut self) -> SupervisorStats {
        info!(
            port = %self.settings.port,
            baud_rate = self.settings.baud_rate,
            "Serial supervisor started"
        );

        while !self.cancel.is_cancelled() {
            self.processor
                .sink()
                .set_connection(ConnectionState::connecting(), None);
            self.stats.connect_attempts += 1;

            let link = match self.open().await {
                Ok(link) => link,
                Err(e) => {
                    self.stats.connect_failures += 1;
                    warn!(
                        port = %self.settings.port,
                        attempt = self.stats.connect_attempts,
                        port_busy = e.is_busy(),
                        retry_secs = self.settings.connect_retry.as_secs(),
                        error = %e,
                        "Serial open failed"
                    );
                    self.processor.sink().set_connection(
                        ConnectionState::disconnected(e.is_busy(), e.to_string()),
                        Some(format!("Serial error: {e}")),
                    );
                    if self.sleep_or_cancel(self.settings.connect_retry).await {
                        break;
                    }
                    continue;
                }
            };

            info!(port = %self.settings.port, "Serial link connected");
            self.processor.on_connected();
            self.processor.sink().set_connection(
                ConnectionState::connected(),
                Some(format!("Connected to {}", self.settings.port)),
            );

            match self.serve(&link).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Dropped(e) => {
                    self.stats.link_drops += 1;
                    warn!(
                        port = %self.settings.port,
                        backoff_secs = self.settings.drop_backoff.as_secs(),
                        error = %e,
                        "Serial link dropped"
                    );
                    drop(link);
                    self.processor.sink().set_connection(
                        ConnectionState::disconnected(false, e.to_string()),
                        Some(format!("Serial error: {e}")),
                    );
                    if self.sleep_or_cancel(self.settings.drop_backoff).await {
                        break;
                    }
                }
            }
        }

        self.processor.sink().set_connection(
            ConnectionState::disconnected(false, "Supervisor stopped"),
            None,
        );
        info!(
            lines = self.stats.lines_processed,
            commands = self.stats.commands_sent,
            drops = self.stats.link_drops,
            "Serial supervisor stopped"
        );
        self.stats
    }

    /// Open the port and discard stale input.
    async fn open(&self) -> Result<SharedLink, SerialError> {
        let opener = Arc::clone(&self.opener);
        let port = self.settings.port.clone();
        let baud_rate = self.settings.baud_rate;

        let link = tokio::task::spawn_blocking(move || {
            let mut link = opener.open(&port, baud_rate)?;
            link.clear_input()?;
            Ok::<_, SerialError>(link)
        })
        .await
        .map_err(|e| SerialError::Driver(format!("blocking open task failed: {e}")))??;

        Ok(Arc::new(Mutex::new(link)))
    }

    /// Connected-phase loop.
    async fn serve(&mut self, link: &SharedLink) -> SessionEnd {
        loop {
            if self.cancel.is_cancelled() {
                return SessionEnd::Cancelled;
            }

            let waiting = match with_link(link, |l| l.bytes_to_read()).await {
                Ok(n) => n,
                Err(e) => return SessionEnd::Dropped(e),
            };

            if waiting == 0 {
                if self.sleep_or_cancel(self.settings.idle_poll).await {
                    return SessionEnd::Cancelled;
                }
                continue;
            }

            let line = match with_link(link, drain_latest_line).await {
                Ok(Some(line)) => line,
                Ok(None) => continue,
                Err(e) => return SessionEnd::Dropped(e),
            };

            self.stats.lines_processed += 1;
            debug!(line = %line, "Serial line received");

            if let Some(cmd) = self.processor.ingest_line(&line) {
                if let Err(e) = send_command(link, cmd).await {
                    warn!(command = %cmd, error = %e, "Failed to write command to device");
                    return SessionEnd::Dropped(e);
                }
                self.stats.commands_sent += 1;
                info!(command = %cmd, "Command sent to device");
            }
        }
    }

    /// Sleep for `duration`; returns `true` if cancelled first.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }
}

/// Run a blocking operation against the link on the blocking pool.
async fn with_link<T, F>(link: &SharedLink, op: F) -> Result<T, SerialError>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn SerialLink) -> Result<T, SerialError> + Send + 'static,
{
    let link = Arc::clone(link);
    tokio::task::spawn_blocking(move || {
        let mut guard = link
            .lock()
            .map_err(|_| SerialError::Driver("serial link mutex poisoned".to_string()))?;
        op(&mut **guard)
    })
    .await
    .map_err(|e| SerialError::Driver(format!("blocking serial task failed: {e}")))?
}

async fn send_command(link: &SharedLink, cmd: AiCommand) -> Result<(), SerialError> {
    let frame = cmd.wire_frame();
    with_link(link, move |l| l.write_all(frame.as_bytes())).await
}

/// Read every complete buffered line and keep only the newest non-empty one.
pub fn drain_latest_line(link: &mut dyn SerialLink) -> Result<Option<String>, SerialError> {
    let mut latest = None;
    for _ in 0..MAX_DRAIN_LINES {
        match link.read_line()? {
            Some(line) if !line.trim().is_empty() => latest = Some(line),
            Some(_) => {}
            None => break,
        }
    }
    Ok(latest)
}
