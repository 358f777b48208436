//! Sensor data acquisition module
//!
//! Handles the serial link to the gas sensor board: line parsing, the
//! blocking link seam, a simulated board, and the reconnecting supervisor.

pub mod line_parser;
pub mod serial_link;
pub mod simulated;
pub mod supervisor;

pub use line_parser::parse_line;
pub use serial_link::{LineBuffer, PortOpener, SerialError, SerialLink, SerialPortOpener};
pub use simulated::{GasSignal, SimulatedOpener};
pub use supervisor::{drain_latest_line, ConnectionSupervisor, SupervisorSettings, SupervisorStats};
