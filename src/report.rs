//! Certification verdict for one profile, with a printable report.

use crate::metrics::ClockQualityMetrics;
use crate::profile::ProfileConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub profile_name: String,
    pub generated_at: DateTime<Utc>,
    pub accuracy_requirement_ns: i64,
    pub max_lock_time_seconds: u32,
    pub max_std_dev_ns: f64,
    /// Protocol parameters carried by the profile; listed, not measured here
    pub late_response_threshold_ms: u32,
    pub immediate_ascapable_required: bool,
    pub min_pdelay_successes: u32,
    pub max_pdelay_successes: u32,
    pub accuracy_pass: bool,
    pub lock_time_pass: bool,
    pub stability_pass: bool,
    /// All three checks passed
    pub certified: bool,
    pub metrics: ClockQualityMetrics,
}

impl ComplianceReport {
    pub fn evaluate(profile_name: &str, profile: &ProfileConfig, metrics: &ClockQualityMetrics) -> Self {
        let accuracy_pass = metrics.meets_80ns_requirement;
        let lock_time_pass = metrics.meets_lock_time_requirement;
        let stability_pass = metrics.meets_stability_requirement;

        ComplianceReport {
            profile_name: profile_name.to_string(),
            generated_at: Utc::now(),
            accuracy_requirement_ns: profile.accuracy_requirement_ns,
            max_lock_time_seconds: profile.max_lock_time_seconds,
            max_std_dev_ns: profile.max_std_dev_ns,
            late_response_threshold_ms: profile.late_response_threshold_ms,
            immediate_ascapable_required: profile.immediate_ascapable_required,
            min_pdelay_successes: profile.min_pdelay_successes,
            max_pdelay_successes: profile.max_pdelay_successes,
            accuracy_pass,
            lock_time_pass,
            stability_pass,
            certified: accuracy_pass && lock_time_pass && stability_pass,
            metrics: metrics.clone(),
        }
    }

    pub fn render(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "=== {} Clock Quality Compliance Report ===", self.profile_name);
        let _ = writeln!(out, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let _ = writeln!(
            out,
            "Method: {}  Window: {}s  Observed: {:.3}s  Samples: {}",
            m.measurement_method, m.window_seconds, m.observation_window_seconds, m.total_measurements
        );
        out.push('\n');

        let _ = writeln!(out, "--- Time Error ---");
        let _ = writeln!(out, "  Requirement:  ±{}ns", self.accuracy_requirement_ns);
        let _ = writeln!(out, "  Mean:         {:+}ns", m.mean_time_error_ns);
        let _ = writeln!(out, "  Max:          {:+}ns", m.max_time_error_ns);
        let _ = writeln!(out, "  Min:          {:+}ns", m.min_time_error_ns);
        let _ = writeln!(out, "  RMS:          {:.2}ns", m.rms_error_ns);
        let _ = writeln!(out, "  Result:       {}", verdict(self.accuracy_pass));
        out.push('\n');

        let _ = writeln!(out, "--- Lock Time ---");
        let _ = writeln!(out, "  Requirement:  ≤{}s", self.max_lock_time_seconds);
        let _ = writeln!(out, "  Locked:       {}", if m.is_locked { "yes" } else { "no" });
        let _ = writeln!(out, "  Lock time:    {:.3}s", m.lock_time_seconds);
        let _ = writeln!(out, "  Good run:     {} samples", m.consecutive_good_measurements);
        let _ = writeln!(out, "  Result:       {}", verdict(self.lock_time_pass));
        out.push('\n');

        let _ = writeln!(out, "--- Stability ---");
        let _ = writeln!(out, "  Requirement:  σ < {:.1}ns", self.max_std_dev_ns);
        let _ = writeln!(out, "  Std dev:      {:.2}ns", m.std_dev_ns);
        let _ = writeln!(out, "  Drift:        {:+.3}ppb", m.frequency_stability_ppb);
        let _ = writeln!(out, "  Result:       {}", verdict(self.stability_pass));
        out.push('\n');

        let _ = writeln!(out, "--- Profile Parameters ---");
        let _ = writeln!(out, "  Late response:      >{}ms", self.late_response_threshold_ms);
        let _ = writeln!(
            out,
            "  Immediate asCapable: {}",
            if self.immediate_ascapable_required { "required" } else { "not required" }
        );
        let _ = writeln!(
            out,
            "  Pdelay successes:   {}..={}",
            self.min_pdelay_successes, self.max_pdelay_successes
        );
        out.push('\n');

        let _ = writeln!(
            out,
            "Overall Compliance: {}",
            if self.certified { "CERTIFIED" } else { "NOT CERTIFIED" }
        );
        out
    }
}

fn verdict(pass: bool) -> &'static str {
    if pass {
        "PASS"
    } else {
        "FAIL"
    }
}
