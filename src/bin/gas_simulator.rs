//! Gas Sensor Board Simulation
//!
//! Prints the line protocol a real MQ-2/MQ-135 board emits, with periodic gas
//! events, so the engine can be exercised through a virtual serial pair.
//!
//! # Usage
//! ```bash
//! socat -d -d pty,raw,echo=0,link=/tmp/gas-board pty,raw,echo=0,link=/tmp/gas-host &
//! ./gas-simulator --rate 10 > /tmp/gas-board &
//! ./gas-sentinel --port /tmp/gas-host
//! ```

use std::io::{self, Write};
use std::time::Duration;

use clap::{Parser, ValueEnum};

use gas_sentinel::acquisition::GasSignal;
use gas_sentinel::config::defaults::PPM_PER_VOLT;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// `MQ2: 0.45V, MQ135: 0.35V`
    KeyValue,
    /// `{"mq2":158.0,"mq135":122.0}` (PPM-style values)
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "gas-simulator")]
#[command(about = "Synthetic MQ-2/MQ-135 sensor board output")]
#[command(version)]
struct Args {
    /// Output sample rate in Hz
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=1000))]
    rate: u32,

    /// Number of samples to emit (0 = run forever)
    #[arg(long, default_value = "0")]
    samples: u64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, value_enum, default_value = "key-value")]
    format: Format,
}

/// One JSON sample with both voltages scaled to PPM.
fn json_line(mq2_voltage: f64, mq135_voltage: f64) -> String {
    serde_json::json!({
        "mq2": (mq2_voltage * PPM_PER_VOLT).round(),
        "mq135": (mq135_voltage * PPM_PER_VOLT).round(),
    })
    .to_string()
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let mut signal = GasSignal::new(args.seed);
    let period = Duration::from_secs_f64(1.0 / f64::from(args.rate));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut emitted = 0u64;

    while args.samples == 0 || emitted < args.samples {
        let line = match args.format {
            Format::KeyValue => signal.next_line(),
            Format::Json => {
                let (mq2, mq135) = signal.next_pair();
                json_line(mq2, mq135)
            }
        };
        writeln!(out, "{line}")?;
        out.flush()?;
        emitted += 1;
        std::thread::sleep(period);
    }
    Ok(())
}
