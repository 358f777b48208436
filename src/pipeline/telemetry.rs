//! Telemetry sink: the shared latest-value snapshot
//!
//! The supervisor task is the only writer. Each update clones the previous
//! snapshot, applies the change and swaps the new version in atomically, so
//! readers on any task or thread always see a complete snapshot and never
//! block the writer. Subscribers are woken through a `watch` channel that
//! carries the same `Arc`.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::types::{AiCommand, ConnectionState, LatestSnapshot};

pub struct TelemetrySink {
    current: ArcSwap<LatestSnapshot>,
    tx: watch::Sender<Arc<LatestSnapshot>>,
}

impl Default for TelemetrySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink {
    pub fn new() -> Self {
        let initial = Arc::new(LatestSnapshot::default());
        let (tx, _rx) = watch::channel(Arc::clone(&initial));
        Self {
            current: ArcSwap::new(initial),
            tx,
        }
    }

    /// Immutable copy of the latest snapshot.
    pub fn snapshot(&self) -> Arc<LatestSnapshot> {
        self.current.load_full()
    }

    /// Receiver that is notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<LatestSnapshot>> {
        self.tx.subscribe()
    }

    /// Build the next snapshot from the current one and publish it.
    ///
    /// Single writer: concurrent callers would race on the read-modify-write.
    pub fn publish<F>(&self, apply: F) -> Arc<LatestSnapshot>
    where
        F: FnOnce(&mut LatestSnapshot),
    {
        let mut next = LatestSnapshot::clone(&self.current.load());
        apply(&mut next);
        next.sequence += 1;
        next.updated_at = Utc::now();

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        self.tx.send_replace(Arc::clone(&next));
        next
    }

    /// Record a connectivity change. `raw_log` replaces the raw line text when given.
    pub fn set_connection(&self, connection: ConnectionState, raw_log: Option<String>) {
        debug!(phase = %connection.phase, connected = connection.connected, "Connection state published");
        self.publish(|snap| {
            snap.connection = connection;
            if let Some(log) = raw_log {
                snap.raw_log = log;
            }
        });
    }
}

/// Edge trigger for outbound device commands.
///
/// A command passes only when it differs from the last one that passed.
/// Reset on every new connection so the device is resynchronised.
#[derive(Debug, Default, Clone)]
pub struct CommandGate {
    last_sent: Option<AiCommand>,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(cmd)` when `cmd` must be written; records it as sent.
    pub fn admit(&mut self, cmd: AiCommand) -> Option<AiCommand> {
        if self.last_sent == Some(cmd) {
            return None;
        }
        self.last_sent = Some(cmd);
        Some(cmd)
    }

    pub fn last_sent(&self) -> Option<AiCommand> {
        self.last_sent
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConnectionPhase;

    #[test]
    fn test_publish_replaces_and_sequences() {
        let sink = TelemetrySink::new();
        let before = sink.snapshot();
        assert_eq!(before.sequence, 0);

        sink.publish(|s| s.raw_log = "MQ2: 1.0".to_string());
        let after = sink.snapshot();
        assert_eq!(after.sequence, 1);
        assert_eq!(after.raw_log, "MQ2: 1.0");
        // Earlier copies are never mutated
        assert_eq!(before.raw_log, "Waiting for data...");
    }

    #[tokio::test]
    async fn test_subscribers_see_latest() {
        let sink = TelemetrySink::new();
        let mut rx = sink.subscribe();

        sink.set_connection(ConnectionState::connecting(), None);
        sink.set_connection(ConnectionState::connected(), Some("Connected".to_string()));

        rx.changed().await.unwrap();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.sequence, 2, "watch keeps only the latest value");
        assert_eq!(snap.connection.phase, ConnectionPhase::Connected);
        assert!(snap.sensor_connected());
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let sink = Arc::new(TelemetrySink::new());
        let reader = {
            let sink = Arc::clone(&sink);
            std::thread::spawn(move || {
                for _ in 0..1000 {
                    let snap = sink.snapshot();
                    // Both fields are written together by every publish
                    assert_eq!(snap.values.mq2_voltage, snap.values.mq135_voltage);
                }
            })
        };
        for i in 0..1000 {
            let v = f64::from(i);
            sink.publish(|s| {
                s.values.mq2_voltage = v;
                s.values.mq135_voltage = v;
            });
        }
        reader.join().unwrap();
        assert_eq!(sink.snapshot().sequence, 1000);
    }

    #[test]
    fn test_command_gate_is_edge_triggered() {
        let mut gate = CommandGate::new();
        assert_eq!(gate.admit(AiCommand::Safe), Some(AiCommand::Safe));
        assert_eq!(gate.admit(AiCommand::Safe), None);
        assert_eq!(gate.admit(AiCommand::Warn), Some(AiCommand::Warn));
        assert_eq!(gate.admit(AiCommand::Warn), None);
        assert_eq!(gate.admit(AiCommand::Safe), Some(AiCommand::Safe));

        gate.reset();
        assert_eq!(gate.admit(AiCommand::Safe), Some(AiCommand::Safe));
    }
}
