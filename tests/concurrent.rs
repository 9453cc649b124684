use shedder::{InFlight, PointWindow, Shedder, TimeWindow, Window};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn point_window_is_consistent_under_concurrent_feeds() {
    let window = Arc::new(PointWindow::new(50));
    let mut workers = Vec::new();
    for t in 0..8 {
        let window = Arc::clone(&window);
        workers.push(thread::spawn(move || {
            for i in 0..100 {
                window.feed((t * 100 + i) as f64);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(window.len(), 50);
}

#[test]
fn time_window_feeds_are_all_observed() {
    // Buckets are wide enough that nothing expires during the test.
    let window = Arc::new(TimeWindow::new(Duration::from_secs(1), 60, 64));
    let mut workers = Vec::new();
    for _ in 0..8 {
        let window = Arc::clone(&window);
        workers.push(thread::spawn(move || {
            for _ in 0..100 {
                window.feed(1.0);
            }
        }));
    }

    // Concurrent reads must observe a consistent snapshot, never panic.
    for _ in 0..50 {
        let count = window.reduce(0.0, &mut |acc, x| acc + x);
        assert!(count >= 0.0);
    }

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(window.len(), 800);
    let total = window.reduce(0.0, &mut |acc, x| acc + x);
    assert!((total - 800.0).abs() < f64::EPSILON);
}

#[test]
fn saturated_gate_rejects_every_concurrent_caller() {
    let counter = Arc::new(InFlight::new());
    let gate = Arc::new(
        Shedder::builder()
            .seed(5)
            .concurrency(5.0, 10.0, Some(Arc::clone(&counter)))
            .build(),
    );

    counter.add(10);
    let barrier = Arc::new(Barrier::new(12));
    let rejected = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();
    for _ in 0..12 {
        let gate = Arc::clone(&gate);
        let barrier = Arc::clone(&barrier);
        let rejected = Arc::clone(&rejected);
        workers.push(thread::spawn(move || {
            barrier.wait();
            if gate.run(|| Ok(())).is_err() {
                rejected.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(rejected.load(Ordering::Relaxed), 12);
    counter.add(-10);
    assert_eq!(counter.value(), 0);
}

#[test]
fn gate_balances_in_flight_tracking_across_threads() {
    let counter = Arc::new(InFlight::new());
    let gate = Arc::new(
        Shedder::builder()
            .seed(5)
            .concurrency(64.0, 128.0, Some(Arc::clone(&counter)))
            .build(),
    );

    let barrier = Arc::new(Barrier::new(12));
    let admitted = Arc::new(AtomicUsize::new(0));
    let mut workers = Vec::new();
    for _ in 0..12 {
        let gate = Arc::clone(&gate);
        let barrier = Arc::clone(&barrier);
        let admitted = Arc::clone(&admitted);
        let counter = Arc::clone(&counter);
        workers.push(thread::spawn(move || {
            barrier.wait();
            let outcome = gate.run(|| {
                assert!(counter.value() >= 1);
                thread::sleep(Duration::from_millis(20));
                Ok(())
            });
            if outcome.is_ok() {
                admitted.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for worker in workers {
        worker.join().unwrap();
    }

    // Far below the lower bound: every caller admitted, and the counter drains.
    assert_eq!(admitted.load(Ordering::Relaxed), 12);
    counter.wait();
    assert_eq!(counter.value(), 0);
}
