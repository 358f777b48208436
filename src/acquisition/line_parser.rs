//! Sensor Line Protocol Parser
//!
//! The microcontroller prints one line per sample in one of two shapes:
//!
//! - key:value pairs separated by commas, e.g. `MQ2: 1.17V, MQ135: 0.76V`
//! - a JSON object, e.g. `{"mq2": 412, "mq135": 188}` (PPM-style values)
//!
//! It also echoes control chatter (`ALERT ...`, `IQ...`) on the same line,
//! which carries no sensor data and is dropped here.
//!
//! Parsing never fails: anything unusable simply yields `None`.

use serde_json::Value;
use tracing::warn;

use crate::config::defaults::PPM_PER_VOLT;
use crate::types::PartialReading;

/// Reserved prefix for device-generated control lines.
const CONTROL_PREFIX: &str = "IQ";

/// Parse one line of device output into the sensor fields it carries.
///
/// Returns `None` for control messages, malformed input, or lines that
/// carry no recognisable sensor field.
pub fn parse_line(line: &str) -> Option<PartialReading> {
    let line = line.trim();
    if line.is_empty() || is_control_line(line) {
        return None;
    }

    if line.starts_with('{') {
        return parse_json(line);
    }

    if line.contains(':') {
        return parse_key_values(line);
    }

    None
}

fn is_control_line(line: &str) -> bool {
    line.to_ascii_uppercase().contains("ALERT") || line.starts_with(CONTROL_PREFIX)
}

// ============================================================================
// JSON shape
// ============================================================================

fn parse_json(line: &str) -> Option<PartialReading> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, line = %line, "Malformed JSON sensor line");
            return None;
        }
    };
    let obj = value.as_object()?;

    let mut partial = PartialReading::default();
    for (key, raw) in obj {
        let Some(v) = json_number(raw) else {
            continue;
        };
        match key.as_str() {
            "mq2" | "mq2_gas" => partial.mq2_gas = Some(v),
            "mq135" | "mq135_air" => partial.mq135_air = Some(v),
            _ => {}
        }
    }

    (!partial.is_empty()).then_some(partial)
}

/// Numbers may arrive as JSON numbers or as numeric strings.
fn json_number(raw: &Value) -> Option<f64> {
    let v = match raw {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

// ============================================================================
// key:value shape
// ============================================================================

fn parse_key_values(line: &str) -> Option<PartialReading> {
    let mut partial = PartialReading::default();

    for pair in line.split(',') {
        let Some((key, value)) = pair.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        if key.contains("alert") || key.contains("iq") {
            continue;
        }
        let Some(v) = parse_voltage(value) else {
            continue;
        };

        if key.contains("mq135") {
            partial.mq135_voltage = Some(v);
            partial.mq135_air = Some(v * PPM_PER_VOLT);
        } else if key.contains("mq2") {
            partial.mq2_voltage = Some(v);
            partial.mq2_gas = Some(v * PPM_PER_VOLT);
        }
    }

    (!partial.is_empty()).then_some(partial)
}

/// `"1.17V"` -> `Some(1.17)`. `NA`, empty, unparseable and non-finite -> `None`.
fn parse_voltage(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let value = trimmed
        .strip_suffix('V')
        .or_else(|| trimmed.strip_suffix('v'))
        .unwrap_or(trimmed)
        .trim();

    if value.is_empty() || value.eq_ignore_ascii_case("NA") {
        return None;
    }

    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
