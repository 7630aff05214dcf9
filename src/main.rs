use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::f64::consts::PI;
use std::path::PathBuf;

use clockquality::config::ClockQualityConfig;
use clockquality::monitor::{IngressEventMonitor, SyncIngressEvent};
use clockquality::report::ComplianceReport;

const PATH_DELAY_NS: u64 = 620;
// Arbitrary master epoch so t1 is far from zero
const MASTER_EPOCH_NS: u64 = 1_700_000_000_000_000_000;

#[derive(Parser, Debug)]
#[command(author, version, about = "gPTP clock quality measurement tool", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulated converging slave through the monitor and print the verdict
    Simulate {
        /// Profile to certify against (defaults to the configured active profile)
        #[arg(short, long)]
        profile: Option<String>,

        #[arg(short, long, default_value_t = 360)]
        seconds: u32,

        #[arg(long, default_value_t = 2_000)]
        initial_error_ns: i64,

        /// Gaussian timestamp noise (1σ)
        #[arg(long, default_value_t = 8.0)]
        jitter_ns: f64,

        /// INI configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Also print the TLV export as hex
        #[arg(long, default_value_t = false)]
        tlv: bool,
    },
    /// Show the layered configuration
    Config {
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Write the effective configuration to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

/// Slave whose offset decays toward zero each Sync, as a servo would pull it in.
struct ConvergingSlave {
    offset_ns: f64,
    jitter_ns: f64,
    pull: f64,
}

impl ConvergingSlave {
    fn new(initial_error_ns: i64, jitter_ns: f64) -> Self {
        ConvergingSlave {
            offset_ns: initial_error_ns as f64,
            jitter_ns: jitter_ns.max(0.0),
            pull: 0.15,
        }
    }

    fn next_error_ns(&mut self) -> i64 {
        self.offset_ns *= 1.0 - self.pull;
        // Box-Muller
        let u1: f64 = rand::random::<f64>().max(f64::MIN_POSITIVE);
        let u2: f64 = rand::random();
        let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
        (self.offset_ns + z0 * self.jitter_ns).round() as i64
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    match args.command {
        Command::Simulate {
            profile,
            seconds,
            initial_error_ns,
            jitter_ns,
            config,
            json,
            tlv,
        } => {
            let mut config = ClockQualityConfig::load(config.as_deref())?;
            if let Some(name) = profile {
                if config.profile(&name).is_none() {
                    return Err(anyhow!("unknown profile '{}'", name));
                }
                config.active_profile = name;
            }
            run_simulation(&config, seconds, initial_error_ns, jitter_ns, json, tlv)
        }
        Command::Config { file, save } => {
            let config = ClockQualityConfig::load(file.as_deref())?;
            print!("{}", config.summary());

            let errors = config.validate();
            if errors.is_empty() {
                println!("Configuration valid.");
            } else {
                for e in &errors {
                    warn!("{}", e);
                }
                println!("{} validation error(s).", errors.len());
            }

            if let Some(path) = save {
                config.save_file(&path)?;
            }
            Ok(())
        }
    }
}

fn run_simulation(
    config: &ClockQualityConfig,
    seconds: u32,
    initial_error_ns: i64,
    jitter_ns: f64,
    json: bool,
    tlv: bool,
) -> Result<()> {
    let monitor = IngressEventMonitor::with_config(config);
    let settings = monitor.analyzer().settings().clone();
    let interval_ms = config.measurement_interval_ms.max(1);
    let interval_ns = u64::from(interval_ms) * 1_000_000;
    let syncs = u64::from(seconds) * 1000 / u64::from(interval_ms);
    let report_every = (10_000 / u64::from(interval_ms)).max(1);

    info!(
        "Simulating {} Syncs ({}s at {}ms), profile {}",
        syncs, seconds, interval_ms, settings.profile_name
    );
    monitor.enable_monitoring(interval_ms);

    let mut slave = ConvergingSlave::new(initial_error_ns, jitter_ns);
    for n in 0..syncs {
        let t1 = MASTER_EPOCH_NS + n * interval_ns;
        let err = slave.next_error_ns();
        let t2 = (i128::from(t1) + i128::from(PATH_DELAY_NS) + i128::from(err)).max(0) as u64;
        monitor.record_sync_ingress_event(&SyncIngressEvent {
            sequence_id: Some(n as u16),
            ..SyncIngressEvent::new(t1, t2, PATH_DELAY_NS)
        });

        if (n + 1) % report_every == 0 {
            let m = monitor.compute_metrics(10);
            info!(
                "[{:>4}s] mean:{:+}ns max:{:+}ns min:{:+}ns sd:{:.1}ns locked:{} run:{}",
                (n + 1) * u64::from(interval_ms) / 1000,
                m.mean_time_error_ns,
                m.max_time_error_ns,
                m.min_time_error_ns,
                m.std_dev_ns,
                m.is_locked,
                m.consecutive_good_measurements
            );
        }
    }

    let metrics = monitor.compute_metrics(settings.analysis_window_seconds);
    let profile = config
        .active_profile_config()
        .cloned()
        .unwrap_or_default();
    let report = ComplianceReport::evaluate(&settings.profile_name, &profile, &metrics);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }

    if tlv {
        let bytes = monitor.export_tlv_data();
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        println!("TLV ({} bytes):", bytes.len());
        for line in hex.chunks(16) {
            println!("  {}", line.join(" "));
        }
    }

    let stats = monitor.stats();
    info!(
        "Recorded {} samples, {} sequence gap(s), {} interval overrun(s), {} time base step(s)",
        stats.recorded, stats.sequence_gaps, stats.interval_overruns, stats.time_base_steps
    );
    Ok(())
}
