//! Clock quality configuration.
//!
//! Layering: built-in defaults, then an INI file, then `GPTP_CLOCK_QUALITY_*`
//! environment variables. The configuration is a plain value owned by whoever
//! builds the monitor; nothing here is process-global.

use crate::measurement::MeasurementMethod;
use crate::profile::{ProfileConfig, ProfileType};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

pub const ENV_METHOD: &str = "GPTP_CLOCK_QUALITY_METHOD";
pub const ENV_INTERVAL: &str = "GPTP_CLOCK_QUALITY_INTERVAL";
pub const ENV_WINDOW: &str = "GPTP_CLOCK_QUALITY_WINDOW";
pub const ENV_HISTORY: &str = "GPTP_CLOCK_QUALITY_HISTORY";
pub const ENV_PROFILE: &str = "GPTP_CLOCK_QUALITY_PROFILE";
pub const ENV_ACCURACY_NS: &str = "GPTP_CLOCK_QUALITY_ACCURACY_NS";
pub const ENV_LOCK_TIME: &str = "GPTP_CLOCK_QUALITY_LOCK_TIME";

const GENERAL_SECTION: &str = "clock_quality";
const PROFILE_SECTION_PREFIX: &str = "profile.";

const MAX_INTERVAL_MS: u32 = 60_000;
const MAX_HISTORY_SIZE: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockQualityConfig {
    pub method: MeasurementMethod,
    /// Expected Sync cadence (125ms for Milan)
    pub measurement_interval_ms: u32,
    /// Window used for exported reports (s)
    pub analysis_window_seconds: u32,
    pub max_history_size: usize,
    /// Locked once the in-bound run is longer than this many samples
    pub lock_min_consecutive: u32,
    pub active_profile: String,
    pub profiles: BTreeMap<String, ProfileConfig>,
}

impl Default for ClockQualityConfig {
    fn default() -> Self {
        let profiles = ProfileType::ALL
            .iter()
            .map(|p| (p.name().to_string(), ProfileConfig::for_profile(*p)))
            .collect();

        ClockQualityConfig {
            method: MeasurementMethod::IngressReporting,
            measurement_interval_ms: 125,
            analysis_window_seconds: 300,
            max_history_size: 10_000,
            lock_min_consecutive: 32,
            active_profile: ProfileType::Milan.name().to_string(),
            profiles,
        }
    }
}

impl ClockQualityConfig {
    /// Defaults, then `path` if given and present, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = ClockQualityConfig::default();

        if let Some(path) = path {
            if path.exists() {
                config.merge_file(path)?;
                info!("Loaded clock quality configuration from {}", path.display());
            } else {
                warn!("Config file {} not found, using defaults", path.display());
            }
        }

        let overrides = config.load_from_environment()?;
        if overrides > 0 {
            info!("Applied {} clock quality override(s) from environment", overrides);
        }
        Ok(config)
    }

    /// Defaults overlaid with the given INI file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let mut config = ClockQualityConfig::default();
        config.merge_file(path)?;
        Ok(config)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        self.merge_ini(&text)
            .with_context(|| format!("parsing {}", path.display()))
    }

    /// Apply every key found in `text` on top of the current values.
    pub fn merge_ini(&mut self, text: &str) -> Result<()> {
        // None = skipping an unknown section
        let mut section: Option<Section> = Some(Section::General);

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| anyhow!("line {}: unterminated section header", line_no))?
                    .trim();
                section = Section::parse(name);
                match &section {
                    Some(Section::Profile(profile)) => {
                        self.profile_mut(profile);
                    }
                    Some(Section::General) => {}
                    None => warn!("line {}: ignoring unknown section [{}]", line_no, name),
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("line {}: expected 'key = value'", line_no))?;
            let (key, value) = (key.trim(), value.trim());

            let known = match &section {
                Some(Section::General) => self.set_general(key, value),
                Some(Section::Profile(name)) => set_profile_key(self.profile_mut(name), key, value),
                None => continue,
            }
            .with_context(|| format!("line {}", line_no))?;

            if !known {
                warn!("line {}: ignoring unknown key '{}'", line_no, key);
            }
        }
        Ok(())
    }

    /// Overrides from the process environment. Returns how many were applied.
    pub fn load_from_environment(&mut self) -> Result<usize> {
        self.apply_env(std::env::vars())
    }

    /// Apply `GPTP_CLOCK_QUALITY_*` overrides from `vars`.
    ///
    /// The profile selection is applied before the per-profile overrides so that
    /// accuracy and lock-time values land on the selected profile.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let found: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(k, _)| k.as_ref().starts_with("GPTP_CLOCK_QUALITY_"))
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().trim().to_string()))
            .collect();

        let mut applied = 0;
        let order = [
            ENV_PROFILE,
            ENV_METHOD,
            ENV_INTERVAL,
            ENV_WINDOW,
            ENV_HISTORY,
            ENV_ACCURACY_NS,
            ENV_LOCK_TIME,
        ];
        for key in order {
            let Some(value) = found.get(key) else { continue };
            match key {
                ENV_PROFILE => self.active_profile = value.clone(),
                ENV_METHOD => self.method = value.parse::<MeasurementMethod>().context(ENV_METHOD)?,
                ENV_INTERVAL => self.measurement_interval_ms = parse_value(key, value)?,
                ENV_WINDOW => self.analysis_window_seconds = parse_value(key, value)?,
                ENV_HISTORY => self.max_history_size = parse_value(key, value)?,
                ENV_ACCURACY_NS => {
                    let ns = parse_value(key, value)?;
                    let active = self.active_profile.clone();
                    self.profile_mut(&active).accuracy_requirement_ns = ns;
                }
                ENV_LOCK_TIME => {
                    let secs = parse_value(key, value)?;
                    let active = self.active_profile.clone();
                    self.profile_mut(&active).max_lock_time_seconds = secs;
                }
                _ => unreachable!(),
            }
            debug!("Environment override {}={}", key, value);
            applied += 1;
        }

        for key in found.keys().filter(|k| !order.contains(&k.as_str())) {
            warn!("Ignoring unknown environment variable {}", key);
        }
        Ok(applied)
    }

    /// INI text that `merge_ini` turns back into an identical configuration.
    pub fn to_ini_string(&self) -> String {
        let mut out = String::from("# gPTP clock quality configuration\n");
        out.push_str(&format!("[{}]\n", GENERAL_SECTION));
        out.push_str(&format!("method = {}\n", self.method));
        out.push_str(&format!("measurement_interval_ms = {}\n", self.measurement_interval_ms));
        out.push_str(&format!("analysis_window_seconds = {}\n", self.analysis_window_seconds));
        out.push_str(&format!("max_history_size = {}\n", self.max_history_size));
        out.push_str(&format!("lock_min_consecutive = {}\n", self.lock_min_consecutive));
        out.push_str(&format!("active_profile = {}\n", self.active_profile));

        for (name, p) in &self.profiles {
            out.push_str(&format!("\n[{}{}]\n", PROFILE_SECTION_PREFIX, name));
            out.push_str(&format!("accuracy_requirement_ns = {}\n", p.accuracy_requirement_ns));
            out.push_str(&format!("max_lock_time_seconds = {}\n", p.max_lock_time_seconds));
            out.push_str(&format!("stability_window_seconds = {}\n", p.stability_window_seconds));
            out.push_str(&format!("max_std_dev_ns = {}\n", p.max_std_dev_ns));
            out.push_str(&format!("min_measurements = {}\n", p.min_measurements));
            out.push_str(&format!("late_response_threshold_ms = {}\n", p.late_response_threshold_ms));
            out.push_str(&format!("immediate_ascapable_required = {}\n", p.immediate_ascapable_required));
            out.push_str(&format!("min_pdelay_successes = {}\n", p.min_pdelay_successes));
            out.push_str(&format!("max_pdelay_successes = {}\n", p.max_pdelay_successes));
        }
        out
    }

    pub fn save_file(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_ini_string())
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Saved clock quality configuration to {}", path.display());
        Ok(())
    }

    /// Every problem found; empty when the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.measurement_interval_ms == 0 || self.measurement_interval_ms > MAX_INTERVAL_MS {
            errors.push(format!(
                "measurement_interval_ms must be within 1..={} (got {})",
                MAX_INTERVAL_MS, self.measurement_interval_ms
            ));
        }
        if self.analysis_window_seconds == 0 {
            errors.push("analysis_window_seconds must be positive".to_string());
        }
        if self.max_history_size == 0 || self.max_history_size > MAX_HISTORY_SIZE {
            errors.push(format!(
                "max_history_size must be within 1..={} (got {})",
                MAX_HISTORY_SIZE, self.max_history_size
            ));
        }
        if self.lock_min_consecutive == 0 {
            errors.push("lock_min_consecutive must be positive".to_string());
        }
        if self.profile(&self.active_profile).is_none() {
            errors.push(format!("active_profile '{}' is not defined", self.active_profile));
        }
        for (name, profile) in &self.profiles {
            errors.extend(profile.validate(name));
        }
        errors
    }

    /// Profile by name; exact match first, then case-insensitive.
    pub fn profile(&self, name: &str) -> Option<&ProfileConfig> {
        self.profiles.get(name).or_else(|| {
            self.profiles
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    pub fn active_profile_config(&self) -> Option<&ProfileConfig> {
        self.profile(&self.active_profile)
    }

    /// Human-readable summary for diagnostics output.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Method: {}\nMeasurement interval: {}ms\nAnalysis window: {}s\nHistory size: {}\nLock run: {} samples\nActive profile: {}\n",
            self.method,
            self.measurement_interval_ms,
            self.analysis_window_seconds,
            self.max_history_size,
            self.lock_min_consecutive,
            self.active_profile
        );
        for (name, p) in &self.profiles {
            out.push_str(&format!(
                "  {}: accuracy ±{}ns, lock ≤{}s, stability {}s (σ<{}ns)\n",
                name, p.accuracy_requirement_ns, p.max_lock_time_seconds, p.stability_window_seconds, p.max_std_dev_ns
            ));
        }
        out
    }

    /// Entry for `name`, created from the matching built-in (or Milan) if missing.
    fn profile_mut(&mut self, name: &str) -> &mut ProfileConfig {
        let key = self
            .profiles
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string());

        self.profiles.entry(key).or_insert_with(|| {
            name.parse::<ProfileType>()
                .map(ProfileConfig::for_profile)
                .unwrap_or_default()
        })
    }

    fn set_general(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "method" => self.method = value.parse::<MeasurementMethod>()?,
            "measurement_interval_ms" => self.measurement_interval_ms = parse_value(key, value)?,
            "analysis_window_seconds" => self.analysis_window_seconds = parse_value(key, value)?,
            "max_history_size" => self.max_history_size = parse_value(key, value)?,
            "lock_min_consecutive" => self.lock_min_consecutive = parse_value(key, value)?,
            "active_profile" => self.active_profile = value.to_string(),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

enum Section {
    General,
    Profile(String),
}

impl Section {
    fn parse(name: &str) -> Option<Section> {
        if name.eq_ignore_ascii_case(GENERAL_SECTION) {
            Some(Section::General)
        } else {
            name.strip_prefix(PROFILE_SECTION_PREFIX)
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(|p| Section::Profile(p.to_string()))
        }
    }
}

fn set_profile_key(profile: &mut ProfileConfig, key: &str, value: &str) -> Result<bool> {
    match key {
        "accuracy_requirement_ns" => profile.accuracy_requirement_ns = parse_value(key, value)?,
        "max_lock_time_seconds" => profile.max_lock_time_seconds = parse_value(key, value)?,
        "stability_window_seconds" => profile.stability_window_seconds = parse_value(key, value)?,
        "max_std_dev_ns" => profile.max_std_dev_ns = parse_value(key, value)?,
        "min_measurements" => profile.min_measurements = parse_value(key, value)?,
        "late_response_threshold_ms" => profile.late_response_threshold_ms = parse_value(key, value)?,
        "immediate_ascapable_required" => profile.immediate_ascapable_required = parse_bool(key, value)?,
        "min_pdelay_successes" => profile.min_pdelay_successes = parse_value(key, value)?,
        "max_pdelay_successes" => profile.max_pdelay_successes = parse_value(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse::<T>()
        .map_err(|e| anyhow!("invalid value '{}' for {}: {}", value, key, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("invalid boolean '{}' for {}", value, key),
    }
}
