//! Windowed clock quality metrics and the statistics behind them.

use crate::measurement::{Measurement, MeasurementMethod};
use serde::{Deserialize, Serialize};

const NS_PER_SEC: f64 = 1_000_000_000.0;

/// Aggregate over one analysis window. Computed fresh per query.
///
/// The zeroed `Default` is what an empty window reports: no samples, every
/// verdict false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClockQualityMetrics {
    /// Valid samples in the window
    pub total_measurements: u32,
    pub mean_time_error_ns: i64,
    pub max_time_error_ns: i64,
    pub min_time_error_ns: i64,
    pub std_dev_ns: f64,
    pub rms_error_ns: f64,

    /// Every sample within the configured accuracy bound (80ns for Milan)
    pub meets_80ns_requirement: bool,
    pub meets_stability_requirement: bool,
    pub meets_lock_time_requirement: bool,

    pub is_locked: bool,
    /// Time from session start to the first sample of the current good run
    pub lock_time_seconds: f64,
    /// Length of the in-bound run ending at the newest sample
    pub consecutive_good_measurements: u32,

    /// Slope of time error over time (ns/s == ppb)
    pub frequency_stability_ppb: f64,

    /// Requested window
    pub window_seconds: u32,
    /// Time between the first and last valid sample of the window
    pub observation_window_seconds: f64,
    pub measurement_method: MeasurementMethod,
}

impl ClockQualityMetrics {
    pub fn empty(window_seconds: u32, method: MeasurementMethod) -> Self {
        ClockQualityMetrics {
            window_seconds,
            measurement_method: method,
            ..Default::default()
        }
    }
}

/// Basic statistics over a set of time errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorSummary {
    pub count: usize,
    pub mean: i64,
    pub max: i64,
    pub min: i64,
    pub std_dev: f64,
    pub rms: f64,
}

pub fn summarize(values: &[i64]) -> Option<ErrorSummary> {
    let first = *values.first()?;
    let count = values.len();

    let mut sum: i128 = 0;
    let mut max = first;
    let mut min = first;
    let mut sum_sq = 0.0f64;
    for &v in values {
        sum += v as i128;
        max = max.max(v);
        min = min.min(v);
        let f = v as f64;
        sum_sq += f * f;
    }

    let mean_exact = sum as f64 / count as f64;

    Some(ErrorSummary {
        count,
        mean: rounded_mean(sum, count),
        max,
        min,
        std_dev: std_dev(values, mean_exact),
        rms: (sum_sq / count as f64).sqrt(),
    })
}

/// Integer mean, rounded to nearest with ties away from zero.
pub fn rounded_mean(sum: i128, count: usize) -> i64 {
    if count == 0 {
        return 0;
    }
    let n = count as i128;
    let mut q = sum / n;
    let r = sum % n;
    if 2 * r.abs() >= n {
        q += sum.signum();
    }
    q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// Bessel-corrected (N-1) standard deviation. Zero for fewer than two samples.
pub fn std_dev(values: &[i64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sq: f64 = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum();
    (sq / (values.len() - 1) as f64).sqrt()
}

/// Number of samples at the end of `samples` whose |error| stays within `bound_ns`.
pub fn trailing_good_run(samples: &[Measurement], bound_ns: i64) -> usize {
    samples
        .iter()
        .rev()
        .take_while(|m| within_bound(m.time_error_ns, bound_ns))
        .count()
}

pub fn within_bound(time_error_ns: i64, bound_ns: i64) -> bool {
    time_error_ns.unsigned_abs() <= bound_ns.unsigned_abs()
}

/// Least-squares slope of time error against capture time, in ppb.
pub fn drift_ppb(samples: &[Measurement]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let t0 = samples[0].timestamp;
    let n = samples.len() as f64;

    let (mut sum_t, mut sum_e) = (0.0, 0.0);
    for m in samples {
        sum_t += m.timestamp.saturating_sub(t0) as f64 / NS_PER_SEC;
        sum_e += m.time_error_ns as f64;
    }
    let (mean_t, mean_e) = (sum_t / n, sum_e / n);

    let (mut cov, mut var) = (0.0, 0.0);
    for m in samples {
        let dt = m.timestamp.saturating_sub(t0) as f64 / NS_PER_SEC - mean_t;
        cov += dt * (m.time_error_ns as f64 - mean_e);
        var += dt * dt;
    }

    if var <= f64::EPSILON {
        0.0
    } else {
        cov / var
    }
}

/// Elapsed seconds between the first and last sample.
pub fn span_seconds(samples: &[Measurement]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp) as f64 / NS_PER_SEC,
        _ => 0.0,
    }
}
