//! Simulated gas sensor board
//!
//! Emits `MQ2: x.xxV, MQ135: y.yyV` lines at the device's 10 Hz rate so the
//! whole engine can run without hardware (`--simulate`). Voltages idle near a
//! clean-air baseline with Gaussian noise and periodically ramp through a
//! gas event into the critical zone and back.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::prelude::*;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, info};

use super::serial_link::{PortOpener, SerialError, SerialLink};

/// Clean-air baseline (V)
const BASE_MQ2: f64 = 0.45;
const BASE_MQ135: f64 = 0.35;
/// Noise standard deviation (V)
const NOISE_STD: f64 = 0.015;
/// Peak voltage reached during a gas event (V)
const EVENT_PEAK: f64 = 2.4;
/// Samples in one full idle/rise/hold/decay cycle
const CYCLE_SAMPLES: u64 = 900;

/// Event intensity in `[0, 1]`: idle, ramp up, hold, ramp down.
fn event_level(sample: u64) -> f64 {
    match sample % CYCLE_SAMPLES {
        p if p < 400 => 0.0,
        p if p < 600 => (p - 400) as f64 / 200.0,
        p if p < 700 => 1.0,
        p => 1.0 - (p - 700) as f64 / 200.0,
    }
}

/// Deterministic-when-seeded signal generator.
pub struct GasSignal {
    rng: StdRng,
    sample: u64,
}

impl GasSignal {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng, sample: 0 }
    }

    /// Next `(mq2, mq135)` voltage pair.
    pub fn next_pair(&mut self) -> (f64, f64) {
        let level = event_level(self.sample);
        self.sample += 1;

        let mq2 = BASE_MQ2 + level * (EVENT_PEAK - BASE_MQ2) + self.noise();
        // MQ-135 responds more weakly to the same plume
        let mq135 = BASE_MQ135 + level * 0.6 * (EVENT_PEAK - BASE_MQ135) + self.noise();
        (mq2.max(0.0), mq135.max(0.0))
    }

    fn noise(&mut self) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        z * NOISE_STD
    }

    pub fn next_line(&mut self) -> String {
        let (mq2, mq135) = self.next_pair();
        format!("MQ2: {mq2:.2}V, MQ135: {mq135:.2}V")
    }
}

/// Opens [`SimulatedLink`]s. Commands written by the engine are recorded.
#[derive(Clone)]
pub struct SimulatedOpener {
    interval: Duration,
    seed: Option<u64>,
    received: Arc<Mutex<Vec<String>>>,
}

impl SimulatedOpener {
    pub fn new(interval: Duration, seed: Option<u64>) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            seed,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Commands the simulated board has received, oldest first.
    pub fn received_commands(&self) -> Vec<String> {
        self.received
            .lock()
            .map(|cmds| cmds.clone())
            .unwrap_or_default()
    }
}

impl PortOpener for SimulatedOpener {
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, SerialError> {
        info!(port = %port, baud_rate, "Opening simulated gas sensor board");
        Ok(Box::new(SimulatedLink {
            signal: GasSignal::new(self.seed),
            interval: self.interval,
            last_emit: Instant::now(),
            received: Arc::clone(&self.received),
        }))
    }
}

/// One simulated session. Lines become available as wall time passes.
pub struct SimulatedLink {
    signal: GasSignal,
    interval: Duration,
    last_emit: Instant,
    received: Arc<Mutex<Vec<String>>>,
}

impl SimulatedLink {
    fn due_lines(&self) -> u32 {
        let due = self.last_emit.elapsed().as_micros() / self.interval.as_micros();
        u32::try_from(due).unwrap_or(u32::MAX)
    }
}

impl SerialLink for SimulatedLink {
    fn bytes_to_read(&mut self) -> Result<u32, SerialError> {
        // Roughly one line's worth of bytes per due sample
        Ok(self.due_lines().saturating_mul(28))
    }

    fn read_line(&mut self) -> Result<Option<String>, SerialError> {
        if self.due_lines() == 0 {
            return Ok(None);
        }
        self.last_emit += self.interval;
        Ok(Some(self.signal.next_line()))
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), SerialError> {
        let text = String::from_utf8_lossy(data).trim_end().to_string();
        debug!(command = %text, "Simulated board received command");
        if let Ok(mut cmds) = self.received.lock() {
            cmds.push(text);
        }
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.last_emit = Instant::now();
        Ok(())
    }
}
