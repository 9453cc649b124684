//! Background CPU sampler.
//!
//! A dedicated thread feeds one host-CPU-percent sample (`[0, 100]`) per
//! polling interval into a point window; the sampler's [`Aggregator`] view is
//! the rolling average of that window (name `"AverageCPU"`). The effective
//! averaging span is `window_size * polling_interval`.
//!
//! Sampling is fail-soft: a non-finite reading feeds nothing and the loop
//! continues. The poller listens on a stop channel so [`CpuSampler::stop`]
//! (and `Drop`) shut it down promptly instead of abandoning the thread.

use crate::aggregate::{Aggregate, Aggregator, Average};
use crate::window::{PointWindow, Window};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use sysinfo::{CpuExt, System, SystemExt};

/// Rolling average of host CPU utilization, fed by a background poller.
pub struct CpuSampler {
    average: Average,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpuSampler {
    /// Start a poller that samples CPU usage every `polling_interval` into a
    /// point window of `window_size` samples.
    pub fn new(polling_interval: Duration, window_size: usize) -> Self {
        let window: Arc<dyn Window> = Arc::new(PointWindow::new(window_size));
        let feeder = Arc::clone(&window);
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("shedder-cpu".to_owned())
            .spawn(move || poll(feeder, polling_interval, stop_rx))
            .ok();
        Self {
            average: Average::new("AverageCPU", window),
            stop_tx: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(handle),
        }
    }

    /// Stop the poller and wait for it to exit. Idempotent.
    pub fn stop(&self) {
        // Dropping the sender disconnects the channel, which ends the loop.
        drop(self.stop_tx.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CpuSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Aggregator for CpuSampler {
    fn aggregate(&self) -> Aggregate {
        self.average.aggregate()
    }

    fn name(&self) -> &str {
        self.average.name()
    }
}

fn poll(window: Arc<dyn Window>, interval: Duration, stop: Receiver<()>) {
    let mut system = System::new();
    // Prime the counters; usage is meaningful only between two refreshes.
    system.refresh_cpu();
    loop {
        match stop.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {}
        }
        system.refresh_cpu();
        let percent = f64::from(system.global_cpu_info().cpu_usage());
        if percent.is_finite() {
            window.feed(percent);
        }
    }
}
