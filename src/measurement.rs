use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One time-error observation.
///
/// `timestamp` is a monotonic capture time in nanoseconds with an arbitrary origin.
/// It is only used for window membership and elapsed-time math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    /// Slave time minus master time at the sampled instant (ns)
    pub time_error_ns: i64,
    /// Monotonic capture time (ns)
    pub timestamp: u64,
    /// Invalid samples stay in history but are skipped by statistics
    pub valid: bool,
}

impl Measurement {
    pub fn new(time_error_ns: i64, timestamp: u64) -> Self {
        Measurement {
            time_error_ns,
            timestamp,
            valid: true,
        }
    }

    pub fn invalid(time_error_ns: i64, timestamp: u64) -> Self {
        Measurement {
            time_error_ns,
            timestamp,
            valid: false,
        }
    }
}

/// How the time error was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MeasurementMethod {
    /// Slave reports ingress timestamps of the master's Sync messages
    #[default]
    IngressReporting,
    /// Slave acts as master towards the test equipment
    ReverseSync,
    /// External 1PPS output compared in hardware
    PpsHardware,
    /// Ingress reporting cross-checked against 1PPS
    Combined,
}

// Single source of truth for names and wire codes.
const METHOD_TABLE: [(MeasurementMethod, &str, u8); 4] = [
    (MeasurementMethod::IngressReporting, "ingress_reporting", 0),
    (MeasurementMethod::ReverseSync, "reverse_sync", 1),
    (MeasurementMethod::PpsHardware, "pps_hardware", 2),
    (MeasurementMethod::Combined, "combined", 3),
];

impl MeasurementMethod {
    pub const ALL: [MeasurementMethod; 4] = [
        MeasurementMethod::IngressReporting,
        MeasurementMethod::ReverseSync,
        MeasurementMethod::PpsHardware,
        MeasurementMethod::Combined,
    ];

    fn entry(self) -> &'static (MeasurementMethod, &'static str, u8) {
        // Every variant has a row; the table test below keeps it that way.
        let idx = match self {
            MeasurementMethod::IngressReporting => 0,
            MeasurementMethod::ReverseSync => 1,
            MeasurementMethod::PpsHardware => 2,
            MeasurementMethod::Combined => 3,
        };
        &METHOD_TABLE[idx]
    }

    pub fn as_str(self) -> &'static str {
        self.entry().1
    }

    /// Code used in the TLV payload
    pub fn code(self) -> u8 {
        self.entry().2
    }

    pub fn from_code(code: u8) -> Result<Self> {
        METHOD_TABLE
            .iter()
            .find(|(_, _, c)| *c == code)
            .map(|(m, _, _)| *m)
            .ok_or_else(|| anyhow!("unknown measurement method code {}", code))
    }
}

impl fmt::Display for MeasurementMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasurementMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        METHOD_TABLE
            .iter()
            .find(|(_, name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(m, _, _)| *m)
            .ok_or_else(|| anyhow!("unknown measurement method '{}'", wanted))
    }
}
