use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Interoperability profiles with their own clock quality requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProfileType {
    Milan,
    Automotive,
    AvnuBase,
}

impl ProfileType {
    pub const ALL: [ProfileType; 3] = [ProfileType::Milan, ProfileType::Automotive, ProfileType::AvnuBase];

    pub fn name(self) -> &'static str {
        match self {
            ProfileType::Milan => "Milan",
            ProfileType::Automotive => "Automotive",
            ProfileType::AvnuBase => "AVnu_Base",
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        ProfileType::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| anyhow!("unknown profile '{}'", wanted))
    }
}

/// Per-profile certification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Max |time error| for the accuracy check (ns)
    pub accuracy_requirement_ns: i64,
    /// Max time from session start to lock (s)
    pub max_lock_time_seconds: u32,
    /// Long window used for the stability check (s)
    pub stability_window_seconds: u32,
    /// Std deviation bound over the stability window (ns)
    pub max_std_dev_ns: f64,
    /// Minimum valid samples before a stability verdict can pass
    pub min_measurements: u32,
    pub late_response_threshold_ms: u32,
    pub immediate_ascapable_required: bool,
    pub min_pdelay_successes: u32,
    pub max_pdelay_successes: u32,
}

impl ProfileConfig {
    pub fn for_profile(profile: ProfileType) -> Self {
        match profile {
            ProfileType::Milan => ProfileConfig {
                accuracy_requirement_ns: 80,
                max_lock_time_seconds: 6,
                stability_window_seconds: 300,
                max_std_dev_ns: 20.0,
                min_measurements: 10,
                late_response_threshold_ms: 15,
                immediate_ascapable_required: false,
                min_pdelay_successes: 2,
                max_pdelay_successes: 10,
            },
            ProfileType::Automotive => ProfileConfig {
                accuracy_requirement_ns: 50, // stricter than Milan
                max_lock_time_seconds: 1,
                stability_window_seconds: 300,
                max_std_dev_ns: 15.0,
                min_measurements: 10,
                late_response_threshold_ms: 10,
                immediate_ascapable_required: true,
                min_pdelay_successes: 1,
                max_pdelay_successes: 10,
            },
            ProfileType::AvnuBase => ProfileConfig {
                accuracy_requirement_ns: 80,
                max_lock_time_seconds: 6,
                stability_window_seconds: 300,
                max_std_dev_ns: 40.0,
                min_measurements: 10,
                late_response_threshold_ms: 10,
                immediate_ascapable_required: false,
                min_pdelay_successes: 2,
                max_pdelay_successes: 10,
            },
        }
    }

    /// Messages for every out-of-range field, prefixed with `scope`.
    pub fn validate(&self, scope: &str) -> Vec<String> {
        let mut errors = Vec::new();
        if self.accuracy_requirement_ns <= 0 {
            errors.push(format!("{}: accuracy_requirement_ns must be positive", scope));
        }
        if self.max_lock_time_seconds == 0 {
            errors.push(format!("{}: max_lock_time_seconds must be positive", scope));
        }
        if self.stability_window_seconds == 0 {
            errors.push(format!("{}: stability_window_seconds must be positive", scope));
        }
        if !(self.max_std_dev_ns.is_finite() && self.max_std_dev_ns > 0.0) {
            errors.push(format!("{}: max_std_dev_ns must be a positive number", scope));
        }
        if self.min_measurements == 0 {
            errors.push(format!("{}: min_measurements must be positive", scope));
        }
        if self.min_pdelay_successes > self.max_pdelay_successes {
            errors.push(format!(
                "{}: min_pdelay_successes ({}) exceeds max_pdelay_successes ({})",
                scope, self.min_pdelay_successes, self.max_pdelay_successes
            ));
        }
        errors
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig::for_profile(ProfileType::Milan)
    }
}
