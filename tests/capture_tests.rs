use std::sync::Arc;
use std::time::Instant;

use fpsprof::aggregator::{analyze_log, AnalysisOptions};
use fpsprof::capture::{
    self, Calibration, CalibrationConfig, CollectingSink, ProfilerConfig, Registry,
    ThreadRecorder, TrimPolicy,
};
use fpsprof::utils::error::CaptureError;

fn fixed_registry() -> Arc<Registry> {
    Arc::new(Registry::with_calibration(
        ProfilerConfig::new(),
        Calibration::new(10_000, 200_000, 350_000),
    ))
}

fn busy(iterations: u64) -> u64 {
    (0..iterations).fold(0u64, |acc, x| acc.wrapping_mul(31).wrapping_add(x))
}

#[test]
fn test_stack_violation_poisons_recorder() {
    let sink = Arc::new(CollectingSink::default());
    {
        let mut rec = ThreadRecorder::new(sink.clone(), Instant::now());
        let outer = rec.push("outer", true);
        let _inner = rec.push("inner", false);

        match rec.pop(outer) {
            Err(CaptureError::StackMismatch(diag)) => {
                assert_eq!(diag.exit_name, "outer");
                assert_eq!(diag.exit_level, 0);
                assert_eq!(diag.current_level, 1);
                assert_eq!(diag.open.len(), 2);
                assert!(diag.open[0].is_exit);
                assert!(!diag.open[1].is_exit);
                let text = diag.to_string();
                assert!(text.contains("outer <- exit is here"));
                assert!(text.ends_with(
                    "error: pop 'outer' event with a stack level of 0, but current stack level is 1"
                ));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(rec.is_poisoned());
    }
    assert!(sink.take().is_empty());
}

#[test]
fn test_captured_run_analyses_end_to_end() {
    let registry = fixed_registry();

    let worker = {
        let registry = registry.clone();
        std::thread::spawn(move || {
            let mut rec = registry.recorder();
            for _ in 0..5 {
                let job = rec.push("job", false);
                busy(1_000);
                rec.pop(job).unwrap();
            }
        })
    };
    worker.join().unwrap();

    {
        let mut rec = registry.recorder();
        for _ in 0..10 {
            let frame = rec.push("frame", true);
            let update = rec.push("update", false);
            busy(5_000);
            rec.pop(update).unwrap();
            let render = rec.push("render", false);
            busy(2_000);
            rec.pop(render).unwrap();
            rec.pop(frame).unwrap();
        }
    }

    let log = registry.take_log();
    assert_eq!(log.threads.len(), 2);
    assert_eq!(log.event_count(), 35);
    for events in log.threads.values() {
        for event in events {
            assert!(event.stop_ns >= event.start_ns);
        }
    }

    let run = analyze_log(&log, &AnalysisOptions::new()).unwrap();
    assert!(run.failures.is_empty());
    let frame_thread = run.frame_thread().unwrap();
    assert_eq!(frame_thread.frame_count(), 10);
    assert_eq!(frame_thread.event_count(), 30);

    let total: u64 = run
        .threads
        .iter()
        .flat_map(|t| t.stats.iter())
        .filter(|s| !s.is_thread_total())
        .map(|s| s.count)
        .sum();
    assert_eq!(total, 35);
}

#[test]
fn test_calibration_policies() {
    let config = CalibrationConfig::new()
        .with_samples(2_000)
        .with_trials(3)
        .with_trim(TrimPolicy::Mean);
    let calibration = capture::calibrate(&config).unwrap();
    assert_eq!(calibration.samples, 2_000);
    assert!(calibration.is_calibrated());
    // The outer interval contains every dummy interval
    assert!(calibration.children_ns >= calibration.self_ns);

    let off = capture::calibrate(&CalibrationConfig::new().with_trials(0)).unwrap();
    assert!(!off.is_calibrated());
}

// The only test in this binary touching the global registry.
#[test]
fn test_global_scope_api() {
    let handle = std::thread::spawn(|| {
        for _ in 0..3 {
            let _frame = capture::frame_scope("tick");
            let _work = capture::scope("work");
            busy(100);
        }
        {
            let outer = capture::push("manual");
            capture::pop(outer).unwrap();
        }
        capture::flush_thread();
    });
    handle.join().unwrap();

    // No shutdown paths configured: finish only takes the log
    let log = capture::finish().unwrap();
    let events: Vec<_> = log.threads.values().flatten().collect();
    assert_eq!(events.len(), 7);
    assert_eq!(events.iter().filter(|e| e.frame).count(), 3);
    assert!(events.iter().any(|e| e.name == "manual" && e.stack_level == 0));
}
