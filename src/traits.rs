use std::time::Instant;

/// Source of the monotonic capture time stamped on each measurement.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureClock {
    /// Capture time (ns) for a Sync whose slave ingress timestamp is `slave_ingress_ns`.
    fn capture_time_ns(&self, slave_ingress_ns: u64) -> u64;
}

/// Uses the slave's ingress timestamp as the capture time.
///
/// Windows follow protocol time rather than host scheduling. The slave time base
/// can step; the monitor keeps its capture timeline monotonic across such steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngressTimestampClock;

impl CaptureClock for IngressTimestampClock {
    fn capture_time_ns(&self, slave_ingress_ns: u64) -> u64 {
        slave_ingress_ns
    }
}

/// Host monotonic clock, nanoseconds since this clock was created.
#[derive(Debug, Clone, Copy)]
pub struct HostMonotonicClock {
    origin: Instant,
}

impl HostMonotonicClock {
    pub fn new() -> Self {
        HostMonotonicClock { origin: Instant::now() }
    }
}

impl Default for HostMonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureClock for HostMonotonicClock {
    fn capture_time_ns(&self, _slave_ingress_ns: u64) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}
