//! Serial link seam
//!
//! The supervisor talks to the device through [`SerialLink`] and obtains
//! links through [`PortOpener`]. Both are blocking by contract; the
//! supervisor calls them from `spawn_blocking` only.
//!
//! [`SerialPortOpener`] opens a real port with the `serialport` crate.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;
use thiserror::Error;
use tracing::{debug, warn};

/// Serial link errors
#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Port {port} is busy: {message}")]
    Busy { port: String, message: String },

    #[error("Failed to open {port}: {message}")]
    Open { port: String, message: String },

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial driver error: {0}")]
    Driver(String),

    #[error("Device closed the link")]
    Closed,
}

impl SerialError {
    /// True when another process holds the device.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<serialport::Error> for SerialError {
    fn from(e: serialport::Error) -> Self {
        Self::Driver(e.to_string())
    }
}

/// Blocking line-oriented connection to the microcontroller.
pub trait SerialLink: Send {
    /// Number of bytes waiting in the driver's input buffer.
    fn bytes_to_read(&mut self) -> Result<u32, SerialError>;

    /// Next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` once no complete line is buffered; a trailing
    /// partial line is kept until its newline arrives.
    fn read_line(&mut self) -> Result<Option<String>, SerialError>;

    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError>;

    /// Discard everything queued on the input side.
    fn clear_input(&mut self) -> Result<(), SerialError>;
}

/// Factory for links. `open` blocks until the port is open or has failed.
pub trait PortOpener: Send + Sync {
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, SerialError>;
}

// ============================================================================
// Line buffering
// ============================================================================

/// Most bytes held while waiting for a newline.
pub const MAX_PENDING_BYTES: usize = 4096;

/// Accumulates raw bytes and yields complete `\n`-terminated lines.
///
/// Bounded: when more than [`MAX_PENDING_BYTES`] accumulate without being
/// consumed, the oldest bytes are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    discarded: u64,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING_BYTES {
            let excess = self.pending.len() - MAX_PENDING_BYTES;
            self.pending.drain(..excess);
            if self.discarded == 0 {
                warn!(
                    limit = MAX_PENDING_BYTES,
                    "Serial input has no line breaks, discarding oldest bytes (check baud rate)"
                );
            }
            self.discarded += excess as u64;
        }
    }

    /// Total bytes dropped by the size cap.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Pop the oldest complete line, stripping `\r\n`. Invalid UTF-8 is replaced.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&raw);
        Some(text.trim_end_matches(['\r', '\n']).to_string())
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

// ============================================================================
// Real port
// ============================================================================

/// Opens hardware ports through the `serialport` crate.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    read_timeout: Duration,
}

impl SerialPortOpener {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, SerialError> {
        let mut builder = serialport::new(port, baud_rate).timeout(self.read_timeout);
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }

        let handle = builder.open().map_err(|e| classify_open_error(port, &e))?;
        debug!(port = %port, baud_rate, "Serial port opened");

        Ok(Box::new(SerialPortLink {
            port: handle,
            lines: LineBuffer::new(),
        }))
    }
}

/// Map a driver open failure onto busy vs. generic.
fn classify_open_error(port: &str, e: &serialport::Error) -> SerialError {
    let message = e.to_string();
    if is_busy_message(&message) {
        SerialError::Busy {
            port: port.to_string(),
            message,
        }
    } else {
        SerialError::Open {
            port: port.to_string(),
            message,
        }
    }
}

/// Linux reports EBUSY, Windows reports access denied for a port held elsewhere.
fn is_busy_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("busy") || lower.contains("access is denied") || lower.contains("in use")
}

struct SerialPortLink {
    port: Box<dyn SerialPort>,
    lines: LineBuffer,
}

impl SerialPortLink {
    /// Move whatever the driver currently holds into the line buffer.
    fn fill(&mut self) -> Result<(), SerialError> {
        let mut chunk = [0u8; 512];
        loop {
            let available = self.port.bytes_to_read()? as usize;
            if available == 0 {
                return Ok(());
            }
            let want = available.min(chunk.len());
            match self.port.read(&mut chunk[..want]) {
                Ok(0) => return Err(SerialError::Closed),
                Ok(n) => self.lines.extend(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(()),
                Err(e) => return Err(SerialError::Io(e)),
            }
        }
    }
}

impl SerialLink for SerialPortLink {
    fn bytes_to_read(&mut self) -> Result<u32, SerialError> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }
        self.fill()?;
        Ok(self.lines.next_line())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.lines.clear();
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }
}
