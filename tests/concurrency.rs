use clockquality::analyzer::{AnalyzerSettings, ClockQualityAnalyzer};
use clockquality::monitor::IngressEventMonitor;
use clockquality::traits::IngressTimestampClock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const STEP_NS: u64 = 125_000_000;

#[test]
fn test_ingest_and_diagnostics_threads() {
    let _ = env_logger::builder().is_test(true).try_init();

    let settings = AnalyzerSettings {
        history_capacity: 1_000,
        ..AnalyzerSettings::default()
    };
    let monitor = Arc::new(IngressEventMonitor::with_analyzer(
        ClockQualityAnalyzer::with_settings(settings),
        IngressTimestampClock,
    ));
    monitor.enable_monitoring(125);
    let done = Arc::new(AtomicBool::new(false));

    // PTP event thread
    let ingest = {
        let monitor = Arc::clone(&monitor);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for n in 0..20_000u64 {
                let t1 = 1_000_000_000 + n * STEP_NS;
                let err = (n % 21) as i64 - 10;
                monitor.record_sync_ingress(t1, (t1 as i64 + 300 + err) as u64, 300);
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    // Diagnostics thread
    let diag = {
        let monitor = Arc::clone(&monitor);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut queries = 0u32;
            while !done.load(Ordering::SeqCst) || queries < 10 {
                let m = monitor.compute_metrics(3_600);
                assert!(m.total_measurements <= 1_000);
                if m.total_measurements > 0 {
                    assert!(m.max_time_error_ns <= 10);
                    assert!(m.min_time_error_ns >= -10);
                    assert!(m.meets_80ns_requirement);
                }
                let bytes = monitor.export_tlv_data();
                assert_eq!(&bytes[..2], &[0x80, 0x01]);
                queries += 1;
            }
            queries
        })
    };

    ingest.join().unwrap();
    let queries = diag.join().unwrap();
    assert!(queries >= 10);

    let m = monitor.compute_metrics(3_600);
    assert_eq!(m.total_measurements, 1_000);
    assert!(m.is_locked);
    assert_eq!(monitor.stats().recorded, 20_000);
}

#[test]
fn test_toggle_while_ingesting() {
    let monitor = Arc::new(IngressEventMonitor::new());
    monitor.enable_monitoring(125);

    let ingest = {
        let monitor = Arc::clone(&monitor);
        thread::spawn(move || {
            for n in 0..5_000u64 {
                let t1 = n * STEP_NS;
                monitor.record_sync_ingress(t1, t1 + 25, 0);
            }
        })
    };

    for i in 0..200 {
        if i % 2 == 0 {
            monitor.disable_monitoring();
        } else {
            monitor.enable_monitoring(125);
        }
    }
    ingest.join().unwrap();

    // Every recorded sample landed in history exactly once
    let recorded = monitor.stats().recorded as usize;
    assert!(monitor.analyzer().len() >= recorded);
    assert!(monitor.analyzer().len() <= 5_000);
}
