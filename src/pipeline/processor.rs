//! Per-line processing: parse → merge → window → classify → forecast → publish
//!
//! Owned by the supervisor task; every call runs on that one task, which is
//! what makes it the single writer of the telemetry snapshot.

use std::sync::Arc;

use tracing::{debug, info};

use super::telemetry::{CommandGate, TelemetrySink};
use crate::acquisition::line_parser::parse_line;
use crate::config::ClassifierConfig;
use crate::ml_engine::{FeatureWindow, ModelStatus, RiskClassifier, TrendForecaster};
use crate::types::{AiCommand, Reading, RiskStatus, SensorValues};

pub struct ReadingProcessor {
    sink: Arc<TelemetrySink>,
    window: FeatureWindow,
    classifier: RiskClassifier,
    forecaster: TrendForecaster,
    gate: CommandGate,
    /// Last known value of every field, merged line by line
    values: SensorValues,
    last_status: Option<RiskStatus>,
    readings_accepted: u64,
}

impl ReadingProcessor {
    pub fn new(sink: Arc<TelemetrySink>, classifier: RiskClassifier, config: &ClassifierConfig) -> Self {
        Self {
            sink,
            window: FeatureWindow::new(config.window_size),
            classifier,
            forecaster: TrendForecaster::new(config.trend_samples, config.sample_interval_secs),
            gate: CommandGate::new(),
            values: SensorValues::default(),
            last_status: None,
            readings_accepted: 0,
        }
    }

    /// Process one raw line. Returns the command to write to the device, if any.
    pub fn ingest_line(&mut self, line: &str) -> Option<AiCommand> {
        let partial = parse_line(line)?;
        partial.merge_into(&mut self.values);
        let values = self.values;
        let raw_log = line.trim().to_string();

        if !partial.has_voltage() {
            debug!(line = %raw_log, "PPM-only line merged");
            self.sink.publish(|snap| {
                snap.values = values;
                snap.raw_log = raw_log;
            });
            return None;
        }

        let reading = Reading::new(values.mq2_voltage, values.mq135_voltage);
        self.window.push(reading.mq2_voltage, reading.mq135_voltage);
        self.readings_accepted += 1;

        let classification = self.classifier.classify(&reading, &self.window);
        let forecast = self.forecaster.forecast(&self.window);

        debug!(
            mq2 = reading.mq2_voltage,
            mq135 = reading.mq135_voltage,
            prediction = %classification.prediction,
            score = classification.risk_score,
            command = %classification.ai_command,
            "Reading classified"
        );
        if self.last_status != Some(classification.status) {
            info!(
                status = %classification.status,
                score = classification.risk_score,
                source = ?classification.source,
                "Risk status changed"
            );
            self.last_status = Some(classification.status);
        }

        self.sink.publish(|snap| {
            snap.values = values;
            snap.reading = Some(reading);
            snap.classification = Some(classification);
            snap.forecast = forecast;
            snap.raw_log = raw_log;
        });

        self.gate.admit(classification.ai_command)
    }

    /// A fresh connection has seen no commands yet.
    pub fn on_connected(&mut self) {
        self.gate.reset();
    }

    pub fn model_status(&self) -> &ModelStatus {
        self.classifier.status()
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn readings_accepted(&self) -> u64 {
        self.readings_accepted
    }

    pub fn sink(&self) -> &Arc<TelemetrySink> {
        &self.sink
    }
}
