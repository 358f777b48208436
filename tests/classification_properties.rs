//! Classification Property Tests
//!
//! Exercises the public classification surface without a serial link: the
//! line protocol, voltage zones and score, the rolling window, model gating,
//! the trend forecast and the archive records derived from a snapshot.

use std::sync::Arc;

use gas_sentinel::acquisition::parse_line;
use gas_sentinel::config::defaults::{CRITICAL_VOLTAGE, WARN_VOLTAGE};
use gas_sentinel::ml_engine::{
    risk_score, risk_status, FeatureVector, FeatureWindow, ModelError, ProbabilisticClassifier,
    RiskClassifier, TrendForecaster,
};
use gas_sentinel::pipeline::{
    derive_records, AlertSeverity, ArchiveSink, Archiver, InMemoryArchive, ReadingProcessor,
    TelemetrySink,
};
use gas_sentinel::types::{
    AiCommand, ConnectionState, PredictionSource, Reading, RiskLabel, RiskStatus, Trend,
};
use gas_sentinel::SentinelConfig;

/// Always answers with the same distribution over SAFE/WARN/CRITICAL.
struct FixedModel {
    proba: [f64; 3],
}

impl ProbabilisticClassifier for FixedModel {
    fn classes(&self) -> &[RiskLabel] {
        &[RiskLabel::Safe, RiskLabel::Warn, RiskLabel::Critical]
    }

    fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        Ok(self.proba.to_vec())
    }
}

fn full_window(mq2: f64, mq135: f64) -> FeatureWindow {
    let mut window = FeatureWindow::new(60);
    for _ in 0..60 {
        window.push(mq2, mq135);
    }
    window
}

// ============================================================================
// Line protocol
// ============================================================================

#[test]
fn test_key_value_line_derives_ppm() {
    let partial = parse_line("MQ2: 1.17, MQ135: 0.76").unwrap();
    assert_eq!(partial.mq2_voltage, Some(1.17));
    assert_eq!(partial.mq135_voltage, Some(0.76));
    assert!((partial.mq2_gas.unwrap() - 409.5).abs() < 1e-9);
    assert!((partial.mq135_air.unwrap() - 266.0).abs() < 1e-9);
}

#[test]
fn test_missing_channel_is_absent_not_zero() {
    let partial = parse_line("MQ2: NA, MQ135: 0.5").unwrap();
    assert_eq!(partial.mq2_voltage, None);
    assert_eq!(partial.mq135_voltage, Some(0.5));
}

#[test]
fn test_control_lines_are_ignored() {
    assert!(parse_line("ALERT: gas detected").is_none());
    assert!(parse_line("IQ: 42").is_none());
    assert!(parse_line("").is_none());
    assert!(parse_line("hello world").is_none());
}

// ============================================================================
// Voltage zones and score
// ============================================================================

#[test]
fn test_low_voltage_is_safe_with_low_score() {
    let mut classifier = RiskClassifier::default();
    let mut window = FeatureWindow::new(60);
    window.push(1.1, 0.6);
    let c = classifier.classify(&Reading::new(1.1, 0.6), &window);

    assert_eq!(c.prediction, RiskLabel::Safe);
    assert_eq!(c.ai_command, AiCommand::Safe);
    assert_eq!(c.status, RiskStatus::Safe);
    assert!(c.risk_score < 50);
}

#[test]
fn test_critical_voltage_on_either_channel() {
    let mut classifier = RiskClassifier::default();
    let mut window = FeatureWindow::new(60);
    window.push(0.4, 2.1);
    let c = classifier.classify(&Reading::new(0.4, 2.1), &window);

    assert_eq!(c.prediction, RiskLabel::Critical);
    assert_eq!(c.ai_command, AiCommand::Critical);
    assert_eq!(c.status, RiskStatus::Danger);
    assert!(c.risk_score >= 90);
}

#[test]
fn test_score_is_bounded_and_monotonic() {
    let mut previous = 0u8;
    for i in 0..=400 {
        let v = f64::from(i) * 0.01;
        let score = risk_score(v);
        assert!(score <= 100);
        assert!(score >= previous, "score dropped at {v} V");
        previous = score;
    }
    assert_eq!(risk_score(0.0), 0);
    assert_eq!(risk_score(5.0), 100);
    assert_eq!(risk_score(f64::NAN), 0);
}

#[test]
fn test_status_zone_boundaries() {
    assert_eq!(risk_status(WARN_VOLTAGE - 0.01), RiskStatus::Safe);
    assert_eq!(risk_status(WARN_VOLTAGE), RiskStatus::Warning);
    assert_eq!(risk_status(CRITICAL_VOLTAGE - 0.01), RiskStatus::Warning);
    assert_eq!(risk_status(CRITICAL_VOLTAGE), RiskStatus::Danger);
}

// ============================================================================
// Rolling window
// ============================================================================

#[test]
fn test_window_features_need_full_window() {
    let mut window = FeatureWindow::new(60);
    for i in 0..59 {
        window.push(f64::from(i), 0.0);
        assert!(window.features().is_none());
    }
    window.push(59.0, 0.0);
    assert!(window.is_full());
    assert!(window.features().is_some());

    window.push(60.0, 0.0);
    assert_eq!(window.len(), 60);
    assert_eq!(window.oldest(), Some((1.0, 0.0)));
    assert_eq!(window.latest(), Some((60.0, 0.0)));
}

// ============================================================================
// Model gating
// ============================================================================

#[test]
fn test_model_used_only_with_full_window() {
    let model = Arc::new(FixedModel { proba: [0.1, 0.8, 0.1] });
    let mut classifier = RiskClassifier::with_model(model, 0.6);

    let mut short = FeatureWindow::new(60);
    short.push(0.5, 0.4);
    let c = classifier.classify(&Reading::new(0.5, 0.4), &short);
    assert_eq!(c.source, PredictionSource::Threshold);
    assert_eq!(c.prediction, RiskLabel::Safe);

    let window = full_window(0.5, 0.4);
    let c = classifier.classify(&Reading::new(0.5, 0.4), &window);
    assert_eq!(c.source, PredictionSource::Model);
    assert_eq!(c.prediction, RiskLabel::Warn);
    assert_eq!(c.ai_command, AiCommand::Warn);
    assert_eq!(classifier.status().total_predictions, 1);
}

#[test]
fn test_low_confidence_model_sends_safe() {
    let model = Arc::new(FixedModel { proba: [0.25, 0.2, 0.55] });
    let mut classifier = RiskClassifier::with_model(model, 0.6);
    let window = full_window(0.5, 0.4);

    let c = classifier.classify(&Reading::new(0.5, 0.4), &window);
    assert_eq!(c.prediction, RiskLabel::Critical);
    assert_eq!(c.ai_command, AiCommand::Safe);
}

#[test]
fn test_voltage_zone_floors_model_command() {
    let model = Arc::new(FixedModel { proba: [0.9, 0.05, 0.05] });
    let mut classifier = RiskClassifier::with_model(model, 0.6);
    let window = full_window(2.3, 0.4);

    let c = classifier.classify(&Reading::new(2.3, 0.4), &window);
    assert_eq!(c.prediction, RiskLabel::Safe);
    assert_eq!(c.status, RiskStatus::Danger);
    assert_eq!(c.ai_command, AiCommand::Critical);
}

// ============================================================================
// Trend forecast
// ============================================================================

#[test]
fn test_critical_level_forecasts_zero_seconds() {
    let forecaster = TrendForecaster::default();
    let window = full_window(2.2, 0.3);
    let forecast = forecaster.forecast(&window).unwrap();

    assert_eq!(forecast.trend, Trend::CriticalStable);
    assert_eq!(forecast.time_to_crit, Some(0.0));
    assert_eq!(forecast.summary(), "0s to Crit");
}

#[test]
fn test_flat_safe_signal_is_stable() {
    let forecaster = TrendForecaster::default();
    let window = full_window(0.4, 0.3);
    let forecast = forecaster.forecast(&window).unwrap();

    assert_eq!(forecast.trend, Trend::Stable);
    assert_eq!(forecast.summary(), "Stable");
}

// ============================================================================
// Archive records
// ============================================================================

#[test]
fn test_disconnected_snapshot_is_not_archived() {
    let telemetry = Arc::new(TelemetrySink::new());
    let mut processor = ReadingProcessor::new(
        Arc::clone(&telemetry),
        RiskClassifier::default(),
        &SentinelConfig::default().classifier,
    );
    processor.ingest_line("MQ2: 2.5, MQ135: 0.8");
    assert!(derive_records(&telemetry.snapshot()).is_none());
}

#[test]
fn test_danger_snapshot_produces_high_alert() {
    let telemetry = Arc::new(TelemetrySink::new());
    telemetry.set_connection(ConnectionState::connected(), None);
    let mut processor = ReadingProcessor::new(
        Arc::clone(&telemetry),
        RiskClassifier::default(),
        &SentinelConfig::default().classifier,
    );
    processor.ingest_line("MQ2: 2.5, MQ135: 0.8");

    let (record, alert) = derive_records(&telemetry.snapshot()).unwrap();
    assert_eq!(record.risk_score, 95);
    assert_eq!(record.ai_command, AiCommand::Critical);

    let alert = alert.unwrap();
    assert_eq!(alert.severity, AlertSeverity::High);
    assert!(!alert.resolved);
    assert_eq!(
        alert.message,
        "Danger Detected! Score: 95% (MQ2: 2.50V|875ppm, MQ135: 0.80V|280ppm) [AI_CRITICAL]"
    );
}

#[tokio::test]
async fn test_archiver_tick_writes_record_and_alert() {
    let telemetry = Arc::new(TelemetrySink::new());
    telemetry.set_connection(ConnectionState::connected(), None);
    let mut processor = ReadingProcessor::new(
        Arc::clone(&telemetry),
        RiskClassifier::default(),
        &SentinelConfig::default().classifier,
    );

    let archive = Arc::new(InMemoryArchive::default());
    let sink: Arc<dyn ArchiveSink> = archive.clone();
    let mut archiver = Archiver::new(
        Arc::clone(&telemetry),
        sink,
        std::time::Duration::from_secs(60),
    );

    processor.ingest_line("MQ2: 0.4, MQ135: 0.3");
    archiver.tick().await;
    processor.ingest_line("MQ2: 1.8, MQ135: 0.3");
    archiver.tick().await;

    assert_eq!(archive.records().len(), 2);
    let alerts = archive.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Medium);

    let stats = archiver.stats();
    assert_eq!(stats.records_written, 2);
    assert_eq!(stats.alerts_written, 1);
    assert_eq!(stats.failures, 0);
}
