pub mod measurement;
pub mod history;
pub mod metrics;
pub mod analyzer;
pub mod monitor;
pub mod traits;
pub mod tlv;
pub mod profile;
pub mod config;
pub mod report;

pub use analyzer::{AnalyzerSettings, ClockQualityAnalyzer};
pub use config::ClockQualityConfig;
pub use measurement::{Measurement, MeasurementMethod};
pub use metrics::ClockQualityMetrics;
pub use monitor::{IngressEventMonitor, MonitorStats, SyncIngressEvent};
pub use profile::{ProfileConfig, ProfileType};
pub use report::ComplianceReport;
