//! Processing pipeline
//!
//! - `processor`: turns raw device lines into published snapshots and commands
//! - `telemetry`: lock-free latest-value snapshot plus the command edge trigger
//! - `archiver`: periodic history records and alerts

pub mod archiver;
pub mod processor;
pub mod telemetry;

pub use archiver::{
    alert_message, derive_records, AlertRecord, AlertSeverity, ArchiveError, ArchiveRecord,
    ArchiveSink, Archiver, ArchiverStats, InMemoryArchive, JsonLinesArchive,
};
pub use processor::ReadingProcessor;
pub use telemetry::{CommandGate, TelemetrySink};
