//! Clock Quality Analyzer
//!
//! Owns the bounded measurement history and turns it into windowed metrics:
//! - accuracy: every valid sample within ±accuracy bound
//! - lock: a run of in-bound samples ending at the newest sample
//! - stability: low deviation across the long (stability) window
//! - frequency stability: least-squares drift of the time error
//!
//! Ingestion and analysis may run on different threads. A single mutex guards
//! the history; analysis copies the records it needs and computes outside the lock.

use crate::config::ClockQualityConfig;
use crate::history::MeasurementHistory;
use crate::measurement::{Measurement, MeasurementMethod};
use crate::metrics::{self, ClockQualityMetrics};
use crate::profile::{ProfileConfig, ProfileType};
use crate::tlv::{self, QualityTlv};
use log::{debug, warn};
use parking_lot::Mutex;

const NS_PER_SEC: u64 = 1_000_000_000;

/// Thresholds and sizing for one analyzer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub profile_name: String,
    pub method: MeasurementMethod,
    pub accuracy_requirement_ns: i64,
    pub max_lock_time_seconds: u32,
    pub stability_window_seconds: u32,
    pub max_std_dev_ns: f64,
    pub min_stability_samples: u32,
    pub lock_min_consecutive: u32,
    pub history_capacity: usize,
    /// Window used by `export_tlv_data`
    pub analysis_window_seconds: u32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        let config = ClockQualityConfig::default();
        let milan = ProfileConfig::for_profile(ProfileType::Milan);
        AnalyzerSettings::from_parts(&config, ProfileType::Milan.name(), &milan)
    }
}

impl AnalyzerSettings {
    /// Settings for the configuration's active profile.
    ///
    /// An invalid configuration is logged and replaced by the built-in defaults.
    pub fn from_config(config: &ClockQualityConfig) -> Self {
        let errors = config.validate();
        if !errors.is_empty() {
            for e in &errors {
                warn!("Clock quality config: {}", e);
            }
            warn!("Falling back to built-in clock quality defaults");
            return AnalyzerSettings::default();
        }

        match config.active_profile_config() {
            Some(profile) => AnalyzerSettings::from_parts(config, &config.active_profile, profile),
            None => AnalyzerSettings::default(),
        }
    }

    fn from_parts(config: &ClockQualityConfig, profile_name: &str, profile: &ProfileConfig) -> Self {
        AnalyzerSettings {
            profile_name: profile_name.to_string(),
            method: config.method,
            accuracy_requirement_ns: profile.accuracy_requirement_ns,
            max_lock_time_seconds: profile.max_lock_time_seconds,
            stability_window_seconds: profile.stability_window_seconds,
            max_std_dev_ns: profile.max_std_dev_ns,
            min_stability_samples: profile.min_measurements,
            lock_min_consecutive: config.lock_min_consecutive,
            history_capacity: config.max_history_size,
            analysis_window_seconds: config.analysis_window_seconds,
        }
    }
}

struct AnalyzerState {
    history: MeasurementHistory,
    /// Timestamp of the first record since creation or `clear()`
    session_start: Option<u64>,
    /// Timestamp of the first record of the current in-bound run
    good_run_start: Option<u64>,
    rejected_out_of_order: u64,
}

/// Records copied out of the history for one query.
struct Snapshot {
    latest: u64,
    session_start: u64,
    good_run_start: Option<u64>,
    records: Vec<Measurement>,
}

pub struct ClockQualityAnalyzer {
    settings: AnalyzerSettings,
    state: Mutex<AnalyzerState>,
}

impl Default for ClockQualityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockQualityAnalyzer {
    /// Analyzer with the Milan defaults.
    pub fn new() -> Self {
        Self::with_settings(AnalyzerSettings::default())
    }

    pub fn from_config(config: &ClockQualityConfig) -> Self {
        Self::with_settings(AnalyzerSettings::from_config(config))
    }

    pub fn with_settings(settings: AnalyzerSettings) -> Self {
        let history = MeasurementHistory::with_capacity(settings.history_capacity);
        ClockQualityAnalyzer {
            settings,
            state: Mutex::new(AnalyzerState {
                history,
                session_start: None,
                good_run_start: None,
                rejected_out_of_order: 0,
            }),
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Append a record, evicting the oldest when the history is full.
    ///
    /// Records older than the newest stored one are dropped and counted; window
    /// math depends on non-decreasing timestamps. Returns whether it was stored.
    pub fn add_measurement(&self, record: Measurement) -> bool {
        let mut state = self.state.lock();

        if let Some(latest) = state.history.latest().map(|m| m.timestamp) {
            if record.timestamp < latest {
                state.rejected_out_of_order += 1;
                debug!(
                    "[Quality] Dropping out-of-order sample: ts={} < latest={}",
                    record.timestamp, latest
                );
                return false;
            }
        }

        if state.session_start.is_none() {
            state.session_start = Some(record.timestamp);
        }
        if record.valid {
            if metrics::within_bound(record.time_error_ns, self.settings.accuracy_requirement_ns) {
                if state.good_run_start.is_none() {
                    state.good_run_start = Some(record.timestamp);
                }
            } else {
                state.good_run_start = None;
            }
        }

        state.history.push(record);
        true
    }

    /// Metrics over `[latest - window_seconds, latest]`.
    pub fn analyze_window(&self, window_seconds: u32) -> ClockQualityMetrics {
        let window_ns = u64::from(window_seconds) * NS_PER_SEC;
        let stability_ns = u64::from(self.settings.stability_window_seconds) * NS_PER_SEC;

        match self.snapshot(window_ns.max(stability_ns)) {
            Some(snapshot) => self.compute(window_seconds, window_ns, stability_ns, &snapshot),
            None => ClockQualityMetrics::empty(window_seconds, self.settings.method),
        }
    }

    /// Same as [`analyze_window`](Self::analyze_window).
    pub fn compute_metrics(&self, window_seconds: u32) -> ClockQualityMetrics {
        self.analyze_window(window_seconds)
    }

    /// TLV report of the configured analysis window.
    pub fn export_tlv_data(&self) -> Vec<u8> {
        let metrics = self.analyze_window(self.settings.analysis_window_seconds);
        tlv::encode(&QualityTlv {
            profile_name: self.settings.profile_name.clone(),
            accuracy_requirement_ns: self.settings.accuracy_requirement_ns,
            metrics,
        })
    }

    /// Newest `count` records (valid or not), oldest first.
    pub fn recent_measurements(&self, count: usize) -> Vec<Measurement> {
        self.state.lock().history.copy_recent(count)
    }

    pub fn len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().history.capacity()
    }

    pub fn rejected_out_of_order(&self) -> u64 {
        self.state.lock().rejected_out_of_order
    }

    /// Drop all history and start a new session.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.history.clear();
        state.session_start = None;
        state.good_run_start = None;
        state.rejected_out_of_order = 0;
    }

    fn snapshot(&self, span_ns: u64) -> Option<Snapshot> {
        let state = self.state.lock();
        let latest = state.history.latest()?.timestamp;
        Some(Snapshot {
            latest,
            session_start: state.session_start.unwrap_or(latest),
            good_run_start: state.good_run_start,
            records: state.history.copy_since(latest.saturating_sub(span_ns)),
        })
    }

    fn compute(&self, window_seconds: u32, window_ns: u64, stability_ns: u64, snap: &Snapshot) -> ClockQualityMetrics {
        let s = &self.settings;
        let valid: Vec<Measurement> = snap.records.iter().filter(|m| m.valid).copied().collect();

        let window_from = snap.latest.saturating_sub(window_ns);
        let window = &valid[valid.partition_point(|m| m.timestamp < window_from)..];
        let values: Vec<i64> = window.iter().map(|m| m.time_error_ns).collect();

        let Some(summary) = metrics::summarize(&values) else {
            return ClockQualityMetrics::empty(window_seconds, s.method);
        };

        let bound = s.accuracy_requirement_ns;
        let meets_accuracy = summary.max <= bound && summary.min >= -bound;

        let run = metrics::trailing_good_run(window, bound);
        let is_locked = run > s.lock_min_consecutive as usize;
        let lock_time_seconds = match (is_locked, snap.good_run_start) {
            (true, Some(start)) => start.saturating_sub(snap.session_start) as f64 / NS_PER_SEC as f64,
            _ => 0.0,
        };
        let meets_lock_time = is_locked && lock_time_seconds <= f64::from(s.max_lock_time_seconds);

        let stability_from = snap.latest.saturating_sub(stability_ns);
        let long = &valid[valid.partition_point(|m| m.timestamp < stability_from)..];
        let meets_stability = self.is_stable(long);

        ClockQualityMetrics {
            total_measurements: u32::try_from(summary.count).unwrap_or(u32::MAX),
            mean_time_error_ns: summary.mean,
            max_time_error_ns: summary.max,
            min_time_error_ns: summary.min,
            std_dev_ns: summary.std_dev,
            rms_error_ns: summary.rms,
            meets_80ns_requirement: meets_accuracy,
            meets_stability_requirement: meets_stability,
            meets_lock_time_requirement: meets_lock_time,
            is_locked,
            lock_time_seconds,
            consecutive_good_measurements: u32::try_from(run).unwrap_or(u32::MAX),
            frequency_stability_ppb: metrics::drift_ppb(window),
            window_seconds,
            observation_window_seconds: metrics::span_seconds(window),
            measurement_method: s.method,
        }
    }

    // Stable: enough samples, deviation under the bound, and every sample of the
    // long window inside the accuracy bound.
    fn is_stable(&self, long: &[Measurement]) -> bool {
        let s = &self.settings;
        let values: Vec<i64> = long.iter().map(|m| m.time_error_ns).collect();
        match metrics::summarize(&values) {
            Some(summary) => {
                summary.count >= s.min_stability_samples as usize
                    && summary.std_dev < s.max_std_dev_ns
                    && metrics::trailing_good_run(long, s.accuracy_requirement_ns) >= summary.count
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const STEP_NS: u64 = 125_000_000;
    const BASE_NS: u64 = 5_000_000_000;

    fn feed(analyzer: &ClockQualityAnalyzer, errors: &[i64]) {
        let start = analyzer
            .recent_measurements(1)
            .first()
            .map(|m| m.timestamp + STEP_NS)
            .unwrap_or(BASE_NS);
        for (i, &e) in errors.iter().enumerate() {
            analyzer.add_measurement(Measurement::new(e, start + i as u64 * STEP_NS));
        }
    }

    fn settings_with_capacity(capacity: usize) -> AnalyzerSettings {
        AnalyzerSettings {
            history_capacity: capacity,
            ..AnalyzerSettings::default()
        }
    }

    #[test]
    fn test_empty_analysis() {
        let analyzer = ClockQualityAnalyzer::new();
        let m = analyzer.analyze_window(300);
        assert_eq!(m.total_measurements, 0);
        assert_eq!(m.mean_time_error_ns, 0);
        assert_eq!(m.max_time_error_ns, 0);
        assert_eq!(m.min_time_error_ns, 0);
        assert_eq!(m.std_dev_ns, 0.0);
        assert!(!m.is_locked);
        assert!(!m.meets_80ns_requirement);
        assert!(!m.meets_stability_requirement);
    }

    #[test]
    fn test_single_measurement() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[45]);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.total_measurements, 1);
        assert_eq!(m.mean_time_error_ns, 45);
        assert_eq!(m.max_time_error_ns, 45);
        assert_eq!(m.min_time_error_ns, 45);
        assert_eq!(m.std_dev_ns, 0.0);
        assert_eq!(m.frequency_stability_ppb, 0.0);
        assert!(m.meets_80ns_requirement);
    }

    #[test]
    fn test_statistical_calculations() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[10, 20, 30, 40, 50]);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.total_measurements, 5);
        assert_eq!(m.mean_time_error_ns, 30);
        assert_eq!(m.max_time_error_ns, 50);
        assert_eq!(m.min_time_error_ns, 10);
        assert!((m.std_dev_ns - 15.81).abs() < 0.1);
        assert!(m.meets_80ns_requirement);
        assert!((m.observation_window_seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_negative_errors() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[-30, -20, -10, 10, 20, 30]);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.mean_time_error_ns, 0);
        assert_eq!(m.max_time_error_ns, 30);
        assert_eq!(m.min_time_error_ns, -30);
        assert!(m.meets_80ns_requirement);
    }

    #[test]
    fn test_accuracy_boundaries() {
        let pass = ClockQualityAnalyzer::new();
        feed(&pass, &[-80, -40, -10, 15, 45, 80]);
        assert!(pass.analyze_window(300).meets_80ns_requirement);

        let fail = ClockQualityAnalyzer::new();
        feed(&fail, &[-75, -40, 85, 15, 45, 78]);
        let m = fail.analyze_window(300);
        assert!(!m.meets_80ns_requirement);
        assert!(m.max_time_error_ns > 80);

        let fail_low = ClockQualityAnalyzer::new();
        feed(&fail_low, &[-81, 0]);
        assert!(!fail_low.analyze_window(300).meets_80ns_requirement);
    }

    #[test]
    fn test_lock_detection() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[200, 180, 220, 190, 210]);
        assert!(!analyzer.analyze_window(300).is_locked);

        let small: Vec<i64> = (0..50).map(|i| 10 + (i % 20) - 10).collect();
        feed(&analyzer, &small);

        let m = analyzer.analyze_window(300);
        assert!(m.is_locked);
        assert_eq!(m.consecutive_good_measurements, 50);
        // 5 unlocked samples at 125ms before the run
        assert!((m.lock_time_seconds - 0.625).abs() < 1e-9);
        assert!(m.meets_lock_time_requirement);
    }

    #[test]
    fn test_lock_time_calculation() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..100)
            .map(|i| if i < 20 { 200 - i * 8 } else { (i % 20) - 10 })
            .collect();
        feed(&analyzer, &errors);

        let m = analyzer.analyze_window(300);
        assert!(m.is_locked);
        // First in-bound sample is i=15 (80ns)
        assert!((m.lock_time_seconds - 1.875).abs() < 1e-9);
        assert!(m.lock_time_seconds > 1.0 && m.lock_time_seconds < 6.0);
    }

    #[test]
    fn test_short_run_is_not_lock() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[300; 10]);
        feed(&analyzer, &[5; 20]);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.consecutive_good_measurements, 20);
        assert!(!m.is_locked);
        assert_eq!(m.lock_time_seconds, 0.0);
        assert!(!m.meets_lock_time_requirement);
    }

    #[test]
    fn test_lock_needs_run_longer_than_minimum() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[300]);
        feed(&analyzer, &[5; 32]);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.consecutive_good_measurements, 32);
        assert!(!m.is_locked);

        feed(&analyzer, &[5]);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.consecutive_good_measurements, 33);
        assert!(m.is_locked);
        assert!((m.lock_time_seconds - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_consecutive_good_reset_by_bad_sample() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..100).map(|i| if i == 20 || i == 50 { 150 } else { 25 }).collect();
        feed(&analyzer, &errors);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.consecutive_good_measurements, 49);
        assert!(m.is_locked);
        // Run started right after the bad sample at i=50
        assert!((m.lock_time_seconds - 51.0 * 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_windowed_analysis() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..500).map(|i| 20 + (i % 10) - 5).collect();
        feed(&analyzer, &errors);

        let m60 = analyzer.analyze_window(60);
        let m300 = analyzer.analyze_window(300);
        assert_eq!(m60.total_measurements, 481);
        assert_eq!(m300.total_measurements, 500);
        assert!((m60.mean_time_error_ns - m300.mean_time_error_ns).abs() <= 5);
        assert_eq!(m60.window_seconds, 60);
    }

    #[test]
    fn test_frequency_stability() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..100).map(|i| i + (i % 6) - 3).collect();
        feed(&analyzer, &errors);
        let m = analyzer.analyze_window(300);
        assert!(m.frequency_stability_ppb > 4.0);
        assert!(m.frequency_stability_ppb.abs() < 50.0);
    }

    #[test]
    fn test_outliers_reflected() {
        let analyzer = ClockQualityAnalyzer::new();
        let mut errors: Vec<i64> = (0..90).map(|i| 15 + (i % 10) - 5).collect();
        errors.push(150);
        errors.push(-120);
        feed(&analyzer, &errors);

        let m = analyzer.analyze_window(300);
        assert!(m.max_time_error_ns >= 150);
        assert!(m.min_time_error_ns <= -120);
        assert!(!m.meets_80ns_requirement);
        assert_eq!(m.consecutive_good_measurements, 0);
    }

    #[test]
    fn test_stability_requirement() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..2400).map(|i| 25 + (i % 8) - 4).collect();
        feed(&analyzer, &errors);

        let m = analyzer.analyze_window(300);
        assert!(m.meets_stability_requirement);
        assert!(m.std_dev_ns < 10.0);
        assert!(m.consecutive_good_measurements > 2300);
    }

    #[test]
    fn test_stability_fails_on_noise() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..400).map(|i| if i % 2 == 0 { 60 } else { -60 }).collect();
        feed(&analyzer, &errors);
        let m = analyzer.analyze_window(300);
        assert!(m.meets_80ns_requirement);
        assert!(!m.meets_stability_requirement); // σ ≈ 60ns
    }

    #[test]
    fn test_stability_needs_min_samples() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[5, 5, 5]);
        assert!(!analyzer.analyze_window(300).meets_stability_requirement);
    }

    #[test]
    fn test_history_bound() {
        let analyzer = ClockQualityAnalyzer::with_settings(settings_with_capacity(100));
        let errors: Vec<i64> = (0..250).map(|i| 30 + (i % 20) - 10).collect();
        feed(&analyzer, &errors);

        assert_eq!(analyzer.len(), 100);
        let m = analyzer.analyze_window(3600);
        assert_eq!(m.total_measurements, 100);
        assert!((m.mean_time_error_ns - 30).abs() <= 5);
    }

    #[test]
    fn test_large_history() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..5000).map(|i| 30 + (i % 20) - 10).collect();
        feed(&analyzer, &errors);

        let m = analyzer.analyze_window(300);
        assert!(m.total_measurements > 2000);
        assert!(m.total_measurements < 5001);
        assert!((m.mean_time_error_ns - 30).abs() <= 5);
    }

    #[test]
    fn test_lock_time_survives_eviction() {
        let analyzer = ClockQualityAnalyzer::with_settings(settings_with_capacity(50));
        feed(&analyzer, &[500; 8]);
        feed(&analyzer, &[3; 200]);
        let m = analyzer.analyze_window(300);
        assert!(m.is_locked);
        assert!((m.lock_time_seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_samples_kept_but_ignored() {
        let analyzer = ClockQualityAnalyzer::new();
        analyzer.add_measurement(Measurement::new(10, BASE_NS));
        analyzer.add_measurement(Measurement::invalid(9_999, BASE_NS + STEP_NS));
        analyzer.add_measurement(Measurement::new(20, BASE_NS + 2 * STEP_NS));

        assert_eq!(analyzer.len(), 3);
        let m = analyzer.analyze_window(300);
        assert_eq!(m.total_measurements, 2);
        assert_eq!(m.max_time_error_ns, 20);
        assert_eq!(m.consecutive_good_measurements, 2);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let analyzer = ClockQualityAnalyzer::new();
        assert!(analyzer.add_measurement(Measurement::new(1, 2_000)));
        assert!(!analyzer.add_measurement(Measurement::new(2, 1_000)));
        assert!(analyzer.add_measurement(Measurement::new(3, 2_000)));

        assert_eq!(analyzer.rejected_out_of_order(), 1);
        assert_eq!(analyzer.len(), 2);
    }

    #[test]
    fn test_clear_starts_new_session() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[400; 10]);
        analyzer.clear();
        assert!(analyzer.is_empty());

        analyzer.add_measurement(Measurement::new(0, 1));
        for i in 1..40u64 {
            analyzer.add_measurement(Measurement::new(2, 1 + i * STEP_NS));
        }
        let m = analyzer.analyze_window(300);
        assert!(m.is_locked);
        assert_eq!(m.lock_time_seconds, 0.0);
    }

    #[test]
    fn test_window_monotonic() {
        let analyzer = ClockQualityAnalyzer::new();
        let errors: Vec<i64> = (0..3000).map(|i| (i % 7) - 3).collect();
        feed(&analyzer, &errors);
        let mut previous = 0;
        for window in [1, 10, 60, 120, 300, 600] {
            let total = analyzer.analyze_window(window).total_measurements;
            assert!(total >= previous);
            previous = total;
        }
    }

    #[test]
    fn test_export_tlv() {
        let analyzer = ClockQualityAnalyzer::new();
        feed(&analyzer, &[20; 100]);
        let bytes = analyzer.export_tlv_data();
        assert_eq!(&bytes[..2], &[0x80, 0x01]);
        assert!(bytes.len() > 100 && bytes.len() < 10_000);

        let decoded = tlv::decode(&bytes).unwrap();
        assert_eq!(decoded.profile_name, "Milan");
        assert_eq!(decoded.metrics.total_measurements, 100);
        assert!(decoded.metrics.is_locked);
    }

    #[test]
    fn test_export_tlv_empty() {
        let bytes = ClockQualityAnalyzer::new().export_tlv_data();
        assert_eq!(&bytes[..2], &[0x80, 0x01]);
        assert_eq!(tlv::decode(&bytes).unwrap().metrics.total_measurements, 0);
    }

    #[test]
    fn test_automotive_threshold() {
        let mut config = ClockQualityConfig::default();
        config.active_profile = "Automotive".to_string();
        let analyzer = ClockQualityAnalyzer::from_config(&config);
        assert_eq!(analyzer.settings().accuracy_requirement_ns, 50);

        feed(&analyzer, &[-65, 0, 65]);
        assert!(!analyzer.analyze_window(300).meets_80ns_requirement);
    }

    #[test]
    fn test_invalid_config_falls_back() {
        let mut config = ClockQualityConfig::default();
        config.active_profile = "Automotive".to_string();
        config.max_history_size = 0;
        let settings = AnalyzerSettings::from_config(&config);
        assert_eq!(settings, AnalyzerSettings::default());
        assert_eq!(settings.accuracy_requirement_ns, 80);
    }

    #[test]
    fn test_concurrent_ingest_and_analysis() {
        use std::sync::Arc;
        use std::thread;

        let analyzer = Arc::new(ClockQualityAnalyzer::with_settings(settings_with_capacity(500)));
        let writer = {
            let analyzer = Arc::clone(&analyzer);
            thread::spawn(move || {
                for i in 0..5_000u64 {
                    analyzer.add_measurement(Measurement::new((i % 11) as i64 - 5, i * STEP_NS));
                }
            })
        };

        for _ in 0..200 {
            let m = analyzer.analyze_window(3600);
            assert!(m.total_measurements <= 500);
            if m.total_measurements > 0 {
                assert!(m.max_time_error_ns <= 5 && m.min_time_error_ns >= -5);
            }
        }
        writer.join().unwrap();
        assert_eq!(analyzer.analyze_window(3600).total_measurements, 500);
    }

    proptest! {
        #[test]
        fn in_bound_sequences_meet_accuracy(errors in prop::collection::vec(-80i64..=80, 1..300)) {
            let analyzer = ClockQualityAnalyzer::new();
            feed(&analyzer, &errors);
            let m = analyzer.analyze_window(300);
            prop_assert!(m.meets_80ns_requirement);
            prop_assert!(m.max_time_error_ns <= 80 && m.min_time_error_ns >= -80);
            prop_assert_eq!(m.total_measurements as usize, errors.len());
        }

        #[test]
        fn any_out_of_bound_sample_fails_accuracy(
            mut errors in prop::collection::vec(-80i64..=80, 0..300),
            magnitude in 81i64..1_000_000_000,
            negative in any::<bool>(),
            position in any::<prop::sample::Index>(),
        ) {
            let outlier = if negative { -magnitude } else { magnitude };
            let at = position.index(errors.len() + 1);
            errors.insert(at, outlier);

            let analyzer = ClockQualityAnalyzer::new();
            feed(&analyzer, &errors);
            let m = analyzer.analyze_window(300);
            prop_assert!(!m.meets_80ns_requirement);
            prop_assert!(!m.meets_stability_requirement);
        }

        #[test]
        fn history_never_exceeds_capacity(capacity in 1usize..200, count in 0usize..600) {
            let analyzer = ClockQualityAnalyzer::with_settings(settings_with_capacity(capacity));
            let errors: Vec<i64> = (0..count).map(|i| (i % 9) as i64 - 4).collect();
            feed(&analyzer, &errors);

            prop_assert_eq!(analyzer.len(), count.min(capacity));
            for window in [1u32, 60, 3_600] {
                prop_assert!(analyzer.analyze_window(window).total_measurements as usize <= capacity);
            }
        }
    }
}
