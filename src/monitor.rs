//! Ingress Event Monitor
//!
//! Turns Sync ingress timestamps into time-error samples for the analyzer.
//! Starts disabled; while disabled every ingress call is ignored without touching
//! any state. Called from the PTP event thread, so the record path only does
//! arithmetic and one short lock.
//!
//! Samples are stamped on a monotonic capture timeline derived from the
//! `CaptureClock`. Steps in the clock (servo steps, bad hardware timestamps) are
//! absorbed there, so every Sync taken while enabled reaches the history.

use crate::analyzer::ClockQualityAnalyzer;
use crate::config::ClockQualityConfig;
use crate::measurement::Measurement;
use crate::metrics::ClockQualityMetrics;
use crate::traits::{CaptureClock, IngressTimestampClock};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

const DEFAULT_SAMPLE_INTERVAL_MS: u32 = 125;
const NS_PER_MS: u64 = 1_000_000;
/// Largest forward clock jump still taken as elapsed time
const MAX_CAPTURE_ADVANCE_NS: u64 = 3_600 * 1_000_000_000;

/// One Sync exchange as seen at the slave port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncIngressEvent {
    /// preciseOriginTimestamp from the master (ns)
    pub t1_master_ns: u64,
    /// Ingress timestamp at the slave (ns)
    pub t2_slave_ns: u64,
    /// Mean link delay (ns)
    pub path_delay_ns: u64,
    /// Sum of Sync and Follow_Up correction fields (ns)
    pub correction_ns: i64,
    pub sequence_id: Option<u16>,
}

impl SyncIngressEvent {
    pub fn new(t1_master_ns: u64, t2_slave_ns: u64, path_delay_ns: u64) -> Self {
        SyncIngressEvent {
            t1_master_ns,
            t2_slave_ns,
            path_delay_ns,
            ..Default::default()
        }
    }

    /// `(t2 - t1 - correction) - path_delay`, or `None` when it does not fit in i64.
    pub fn time_error_ns(&self) -> Option<i64> {
        let err = self.t2_slave_ns as i128
            - self.t1_master_ns as i128
            - self.correction_ns as i128
            - self.path_delay_ns as i128;
        i64::try_from(err).ok()
    }
}

/// Counters since the last enable or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Samples stored in the analyzer history
    pub recorded: u64,
    /// Breaks in the Sync sequence id
    pub sequence_gaps: u64,
    /// Captures more than two sample intervals after the previous one
    pub interval_overruns: u64,
    /// Capture clock readings that ran backward or jumped implausibly far
    pub time_base_steps: u64,
}

#[derive(Default)]
struct Tracking {
    last_sequence: Option<u16>,
    /// Clock reading of the previous sample; cleared on enable
    last_raw_ns: Option<u64>,
    /// Capture time handed to the analyzer for the previous sample
    last_capture_ns: Option<u64>,
    stats: MonitorStats,
}

impl Tracking {
    /// Map a clock reading onto the monitor's capture timeline.
    ///
    /// The timeline starts at 0 and never runs backward. Clock deltas in
    /// `0..=MAX_CAPTURE_ADVANCE_NS` are followed; a backward step or an implausible
    /// jump advances by one sample interval instead. Returns `(capture, stepped)`.
    fn advance(&self, raw_ns: u64, interval_ns: u64) -> (u64, bool) {
        match (self.last_raw_ns, self.last_capture_ns) {
            (Some(last_raw), Some(last_capture)) => match raw_ns.checked_sub(last_raw) {
                Some(delta) if delta <= MAX_CAPTURE_ADVANCE_NS => (last_capture.saturating_add(delta), false),
                _ => (last_capture.saturating_add(interval_ns), true),
            },
            // First sample after enable; time spent disabled is not counted
            (None, Some(last_capture)) => (last_capture.saturating_add(interval_ns), false),
            _ => (0, false),
        }
    }
}

pub struct IngressEventMonitor<C = IngressTimestampClock> {
    analyzer: ClockQualityAnalyzer,
    clock: C,
    enabled: AtomicBool,
    sample_interval_ms: AtomicU32,
    default_interval_ms: u32,
    tracking: Mutex<Tracking>,
}

impl Default for IngressEventMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl IngressEventMonitor {
    /// Disabled monitor with the Milan defaults.
    pub fn new() -> Self {
        Self::with_analyzer(ClockQualityAnalyzer::new(), IngressTimestampClock)
    }

    pub fn with_config(config: &ClockQualityConfig) -> Self {
        let mut monitor = Self::with_analyzer(ClockQualityAnalyzer::from_config(config), IngressTimestampClock);
        if config.measurement_interval_ms > 0 {
            monitor.default_interval_ms = config.measurement_interval_ms;
            monitor.sample_interval_ms = AtomicU32::new(config.measurement_interval_ms);
        }
        monitor
    }
}

impl<C: CaptureClock> IngressEventMonitor<C> {
    pub fn with_analyzer(analyzer: ClockQualityAnalyzer, clock: C) -> Self {
        IngressEventMonitor {
            analyzer,
            clock,
            enabled: AtomicBool::new(false),
            sample_interval_ms: AtomicU32::new(DEFAULT_SAMPLE_INTERVAL_MS),
            default_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            tracking: Mutex::new(Tracking::default()),
        }
    }

    /// Start accepting samples. Calling again while enabled only changes the interval.
    ///
    /// A zero interval selects the configured default.
    pub fn enable_monitoring(&self, sample_interval_ms: u32) {
        let interval = if sample_interval_ms == 0 {
            warn!(
                "[Quality] Sample interval 0ms is invalid, using {}ms",
                self.default_interval_ms
            );
            self.default_interval_ms
        } else {
            sample_interval_ms
        };

        // Tracking lock serializes enable against in-flight records.
        let mut tracking = self.tracking.lock();
        self.sample_interval_ms.store(interval, Ordering::Relaxed);
        if self.enabled.swap(true, Ordering::AcqRel) {
            debug!("[Quality] Monitoring interval set to {}ms", interval);
            return;
        }

        tracking.last_sequence = None;
        tracking.last_raw_ns = None;
        tracking.stats = MonitorStats::default();
        info!(
            "[Quality] Monitoring enabled: interval={}ms profile={}",
            interval,
            self.analyzer.settings().profile_name
        );
    }

    pub fn disable_monitoring(&self) {
        let _tracking = self.tracking.lock();
        if self.enabled.swap(false, Ordering::AcqRel) {
            info!("[Quality] Monitoring disabled");
        }
    }

    pub fn is_monitoring_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn sample_interval_ms(&self) -> u32 {
        self.sample_interval_ms.load(Ordering::Relaxed)
    }

    /// Record one Sync from its three timestamps.
    pub fn record_sync_ingress(&self, t1_master_ns: u64, t2_slave_ns: u64, path_delay_ns: u64) {
        self.record_sync_ingress_event(&SyncIngressEvent::new(t1_master_ns, t2_slave_ns, path_delay_ns));
    }

    /// Record one Sync exchange. Returns whether a sample reached the history.
    pub fn record_sync_ingress_event(&self, event: &SyncIngressEvent) -> bool {
        let mut tracking = self.tracking.lock();
        if !self.enabled.load(Ordering::Acquire) {
            return false;
        }

        let interval_ns = u64::from(self.sample_interval_ms()) * NS_PER_MS;
        let raw_ns = self.clock.capture_time_ns(event.t2_slave_ns);
        let (capture_ns, stepped) = tracking.advance(raw_ns, interval_ns);

        let err = event.time_error_ns().unwrap_or_else(|| {
            debug!(
                "[Quality] Time error out of range: t1={} t2={} delay={}",
                event.t1_master_ns, event.t2_slave_ns, event.path_delay_ns
            );
            if event.t2_slave_ns >= event.t1_master_ns {
                i64::MAX
            } else {
                i64::MIN
            }
        });

        if !self.analyzer.add_measurement(Measurement::new(err, capture_ns)) {
            return false;
        }

        if stepped {
            tracking.stats.time_base_steps += 1;
            debug!(
                "[Quality] Capture clock stepped: raw={} last={:?}, using {}",
                raw_ns, tracking.last_raw_ns, capture_ns
            );
        }
        if let (Some(prev), Some(seq)) = (tracking.last_sequence, event.sequence_id) {
            let expected = prev.wrapping_add(1);
            if seq != expected {
                tracking.stats.sequence_gaps += 1;
                debug!("[Quality] Sync sequence gap: expected {} got {}", expected, seq);
            }
        }
        if event.sequence_id.is_some() {
            tracking.last_sequence = event.sequence_id;
        }
        if tracking.last_raw_ns.is_some() {
            if let Some(prev) = tracking.last_capture_ns {
                if capture_ns.saturating_sub(prev) > 2 * interval_ns {
                    tracking.stats.interval_overruns += 1;
                }
            }
        }

        tracking.last_raw_ns = Some(raw_ns);
        tracking.last_capture_ns = Some(capture_ns);
        tracking.stats.recorded += 1;
        true
    }

    /// Metrics over the last `window_seconds` of capture time.
    pub fn compute_metrics(&self, window_seconds: u32) -> ClockQualityMetrics {
        self.analyzer.analyze_window(window_seconds)
    }

    pub fn export_tlv_data(&self) -> Vec<u8> {
        self.analyzer.export_tlv_data()
    }

    pub fn stats(&self) -> MonitorStats {
        self.tracking.lock().stats
    }

    pub fn analyzer(&self) -> &ClockQualityAnalyzer {
        &self.analyzer
    }

    /// Drop history and counters. The enabled state is kept.
    pub fn reset(&self) {
        let mut tracking = self.tracking.lock();
        *tracking = Tracking::default();
        self.analyzer.clear();
        info!("[Quality] Measurement history reset");
    }
}
