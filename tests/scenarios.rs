use shedder::{
    CpuConfig, Decorator, ErrorRateConfig, LatencyConfig, LatencyTracker, PointWindow, Shedder,
    Sum, Window,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn ok() -> Result<(), shedder::BoxError> {
    Ok(())
}

fn fail() -> Result<(), shedder::BoxError> {
    Err("downstream failure".into())
}

#[test]
fn zero_aggregator_shedder_admits_everything() {
    let gate = Shedder::builder().seed(11).build();
    let invoked = AtomicUsize::new(0);
    for _ in 0..1000 {
        gate.run(|| {
            invoked.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
    }
    assert_eq!(invoked.load(Ordering::Relaxed), 1000);
}

#[test]
fn primed_sum_aggregator_rejects_without_invoking() {
    let window = Arc::new(PointWindow::new(1));
    window.feed(1.0);
    let gate = Shedder::builder()
        .seed(11)
        .aggregator(Sum::new("PrimedChance", window))
        .build();

    let invoked = AtomicUsize::new(0);
    let err = gate
        .run(|| {
            invoked.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap_err();

    assert!(err.is_rejected());
    assert_eq!(err.rejection().unwrap().aggregate.name, "PrimedChance");
    assert_eq!(invoked.load(Ordering::Relaxed), 0);
}

#[test]
fn concurrency_rejection_rate_is_roughly_linear_between_bounds() {
    let counter = Arc::new(shedder::InFlight::new());
    let gate = Shedder::builder()
        .seed(1234)
        .concurrency(5.0, 10.0, Some(Arc::clone(&counter)))
        .build();

    // Preset 7 in flight: chance (7 - 5) / (10 - 5) = 0.4.
    counter.add(7);
    let trials = 2000;
    let mut rejected = 0usize;
    for _ in 0..trials {
        if gate.run(ok).is_err() {
            rejected += 1;
        }
    }
    let rate = rejected as f64 / trials as f64;
    assert!((0.3..0.5).contains(&rate), "rejection rate {rate}");
}

#[test]
fn error_rate_signal_rises_and_decays() {
    let cfg = ErrorRateConfig {
        lower: 50.0,
        upper: 75.0,
        bucket: Duration::from_millis(100),
        buckets: 4,
        prealloc_hint: 16,
        min_points: 2,
    };
    let gate = Shedder::builder().seed(42).error_rate(cfg).build();

    // Two successes then two failures: rate 50%, still zero chance.
    gate.run(ok).unwrap();
    gate.run(ok).unwrap();
    gate.run(fail).unwrap_err();
    gate.run(fail).unwrap_err();
    assert_eq!(gate.pressure().value, 0.0);

    // Keep failing until the rate reaches the upper bound. Rejected attempts
    // feed nothing, so only admitted failures move the rate.
    let mut attempts = 0;
    while gate.pressure().value < 1.0 {
        let _ = gate.run(fail);
        attempts += 1;
        assert!(attempts < 200, "error rate never saturated");
    }

    // Saturated: every call is refused without being invoked.
    for _ in 0..20 {
        let err = gate.run(ok).unwrap_err();
        assert!(err.is_rejected());
    }

    // Once the window slides past the failures, the chance returns to zero.
    thread::sleep(Duration::from_millis(500));
    assert_eq!(gate.pressure().value, 0.0);
    gate.run(ok).unwrap();
}

#[test]
fn average_latency_signal_rises_and_decays() {
    let cfg = LatencyConfig {
        lower: 0.010,
        upper: 0.020,
        bucket: Duration::from_millis(200),
        buckets: 4,
        prealloc_hint: 16,
        min_points: 2,
    };
    let gate = Shedder::builder().seed(42).average_latency(cfg).build();

    let slow = || {
        thread::sleep(Duration::from_millis(25));
        Ok(())
    };

    // Below the sample floor the signal is suppressed even though every
    // recorded latency is past the upper bound.
    gate.run(slow).unwrap();
    assert_eq!(gate.pressure().value, 0.0);
    gate.run(slow).unwrap();

    // Two retained samples, both past `upper`: the average is too.
    let worst = gate.pressure();
    assert_eq!(worst.name, "ChanceAverageLatency");
    assert_eq!(worst.value, 1.0);
    let source = worst.source.as_ref().unwrap();
    assert_eq!(source.name, "AverageLatency");
    assert!(source.value >= 0.020, "average {}s", source.value);

    // Saturated: calls are refused without being invoked.
    let invoked = AtomicUsize::new(0);
    for _ in 0..10 {
        let err = gate
            .run(|| {
                invoked.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_rejected());
    }
    assert_eq!(invoked.load(Ordering::Relaxed), 0);

    // Once the window slides past the slow samples the chance returns to zero.
    thread::sleep(Duration::from_millis(900));
    assert_eq!(gate.pressure().value, 0.0);
    gate.run(ok).unwrap();
}

#[test]
fn percentile_latency_signal_rises_and_decays() {
    let cfg = LatencyConfig {
        lower: 0.010,
        upper: 0.020,
        bucket: Duration::from_millis(200),
        buckets: 4,
        prealloc_hint: 16,
        min_points: 3,
    };
    let gate = Shedder::builder()
        .seed(42)
        .percentile_latency(cfg, 50.0)
        .build();

    let slow = || {
        thread::sleep(Duration::from_millis(25));
        Ok(())
    };

    // The first two calls stay under the sample floor: suppressed to zero.
    gate.run(slow).unwrap();
    gate.run(slow).unwrap();
    assert_eq!(gate.pressure().value, 0.0);

    // Third slow call: every retained sample is past `upper`, so P50 is too.
    gate.run(slow).unwrap();
    let worst = gate.pressure();
    assert_eq!(worst.name, "ChanceP50Latency");
    assert_eq!(worst.value, 1.0);
    let source = worst.source.as_ref().unwrap();
    assert_eq!(source.name, "P50Latency");
    assert!(source.value >= 0.020, "P50 {}s", source.value);

    for _ in 0..10 {
        let err = gate.run(ok).unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(err.rejection().unwrap().aggregate.name, "ChanceP50Latency");
    }

    // The chance returns to zero once the window slides past the slow calls.
    thread::sleep(Duration::from_millis(900));
    assert_eq!(gate.pressure().value, 0.0);
    gate.run(ok).unwrap();
}

#[test]
fn cpu_option_wires_the_sampler_as_a_root_signal() {
    // Thresholds no host can reach: the signal reads zero chance, sourced
    // from the sampler's rolling average.
    let idle = Shedder::builder()
        .seed(11)
        .cpu(CpuConfig {
            lower: 1000.0,
            upper: 2000.0,
            polling_interval: Duration::from_millis(10),
            window_size: 4,
        })
        .build();
    thread::sleep(Duration::from_millis(60));
    let worst = idle.pressure();
    assert_eq!(worst.name, "ChanceCPU");
    assert_eq!(worst.value, 0.0);
    let source = worst.source.as_ref().unwrap();
    assert_eq!(source.name, "AverageCPU");
    assert!(source.value.is_finite() && source.value >= 0.0);
    idle.run(ok).unwrap();

    // Thresholds below any possible reading (even the empty window's zero
    // average is past `upper`): every call is refused.
    let saturated = Shedder::builder()
        .seed(11)
        .cpu(CpuConfig {
            lower: -2.0,
            upper: -1.0,
            polling_interval: Duration::from_secs(60),
            window_size: 4,
        })
        .build();
    let err = saturated.run(ok).unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(err.rejection().unwrap().aggregate.name, "ChanceCPU");
}

#[test]
fn latency_decorator_records_elapsed_seconds() {
    let window: Arc<dyn Window> = Arc::new(PointWindow::new(4));
    let tracker = LatencyTracker::new(Arc::clone(&window));

    // Wrap by hand so the recorded elapsed time is observable.
    tracker.wrap(Box::new(|| {
        thread::sleep(Duration::from_millis(5));
        Ok(())
    }))()
    .unwrap();

    let sum = window.reduce(0.0, &mut |acc, x| acc + x);
    assert!(sum >= 0.005, "recorded {sum}s, expected at least the sleep");
    assert!(sum < 0.25, "recorded {sum}s, far beyond the sleep");
}

#[test]
fn rejection_renders_the_full_ratio_chain() {
    let cfg = ErrorRateConfig {
        lower: 50.0,
        upper: 75.0,
        bucket: Duration::from_secs(1),
        buckets: 60,
        prealloc_hint: 16,
        min_points: 1,
    };
    let gate = Shedder::builder().seed(42).error_rate(cfg).build();

    // One admitted failure: rate 100%, chance 1.0 on the next call.
    gate.run(fail).unwrap_err();
    let err = gate.run(ok).unwrap_err();
    assert!(err.is_rejected());

    let rendered = err.to_string();
    assert!(rendered.starts_with("request rejected ChanceErrorRate is 1.000000"));
    assert!(rendered.contains("because ErrorRate is 100.000000"));
    assert!(rendered.contains("because ErrorCount is 1.000000"));
    assert!(rendered.contains("because RequestCount is 1.000000"));
}
