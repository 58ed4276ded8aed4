//! Simulated vehicle battery
//!
//! The deployed vehicle does not report battery telemetry, so the
//! daemon simulates drain: 1% per period while at least one viewer is
//! connected, paused while nobody is watching. The level resumes from
//! where it stopped, it never resets, and it floors at 0.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct DrainWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Battery drain simulator driven by viewer connect/disconnect events
pub struct BatterySimulator {
    level: Arc<Mutex<f64>>,
    period: Duration,
    worker: Mutex<Option<DrainWorker>>,
}

impl BatterySimulator {
    pub fn new(initial_level: f64, period: Duration) -> Self {
        Self {
            level: Arc::new(Mutex::new(initial_level.max(0.0))),
            period,
            worker: Mutex::new(None),
        }
    }

    /// Current battery level (percent)
    pub fn level(&self) -> f64 {
        *self.level.lock()
    }

    /// Battery level as reported in telemetry records (one decimal)
    pub fn reported_level(&self) -> f64 {
        (self.level() * 10.0).round() / 10.0
    }

    /// A viewer connected; `count` is the viewer count after the change.
    ///
    /// Starts the drain worker on the 0 to 1 transition. Calling this
    /// while draining is a no-op, so duplicate notifications are safe.
    pub fn viewer_connected(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);
        let level = Arc::clone(&self.level);
        let period = self.period;

        match thread::Builder::new()
            .name("battery-drain".to_string())
            .spawn(move || Self::drain_loop(level, period, stop_clone))
        {
            Ok(handle) => {
                log::info!("Battery drain started ({} viewer(s))", count);
                *worker = Some(DrainWorker { stop, handle });
            }
            Err(e) => log::error!("Failed to spawn battery drain thread: {}", e),
        }
    }

    /// A viewer disconnected; `count` is the viewer count after the change.
    ///
    /// Stops the drain worker on the 1 to 0 transition. The level keeps
    /// its current value for the next session.
    pub fn viewer_disconnected(&self, count: usize) {
        if count > 0 {
            return;
        }
        if let Some(worker) = self.worker.lock().take() {
            worker.stop.store(true, Ordering::Relaxed);
            let _ = worker.handle.join();
            log::info!("Battery drain paused at {:.1}%", self.level());
        }
    }

    /// Stop the drain worker during daemon shutdown
    pub fn shutdown(&self) {
        self.viewer_disconnected(0);
    }

    fn drain_loop(level: Arc<Mutex<f64>>, period: Duration, stop: Arc<AtomicBool>) {
        let mut deadline = Instant::now() + period;
        while !stop.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                let mut level = level.lock();
                *level = (*level - 1.0).max(0.0);
                log::debug!("Battery level: {:.1}%", *level);
                deadline += period;
                continue;
            }
            // Short sleeps keep shutdown responsive with long periods
            thread::sleep((deadline - now).min(Duration::from_millis(25)));
        }
    }

    #[cfg(test)]
    fn is_draining(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for BatterySimulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
