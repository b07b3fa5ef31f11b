//! Periodic producer thread for hosts without their own timer.

use super::RefillOutcome;
use crate::{PlayerError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Anything that exposes the argument-less producer operation.
pub trait RefillSource: Send {
    /// Run one producer step.
    fn pump(&mut self) -> RefillOutcome;
}

/// Calls [`RefillSource::pump`] at a fixed interval on a dedicated thread.
///
/// The thread stops when [`stop`](Self::stop) is called or the timer is dropped.
pub struct RefillTimer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RefillTimer {
    /// Spawn the producer thread.
    pub fn start<S>(source: Arc<Mutex<S>>, interval: Duration) -> Result<Self>
    where
        S: RefillSource + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("refill-timer".into())
            .spawn(move || run_refill_loop(source, running_clone, interval))
            .map_err(|e| PlayerError::ConfigError(format!("failed to spawn refill thread: {e}")))?;

        debug!(interval_ms = interval.as_millis() as u64, "refill timer started");
        Ok(RefillTimer {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still scheduled to run
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signal shutdown and wait for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("refill thread panicked");
            }
        }
    }
}

impl Drop for RefillTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_refill_loop<S: RefillSource>(
    source: Arc<Mutex<S>>,
    running: Arc<AtomicBool>,
    interval: Duration,
) {
    while running.load(Ordering::Relaxed) {
        let outcome = source.lock().pump();
        if let RefillOutcome::DecodeFailed(reason) = outcome {
            // Keep ticking: a later track switch clears the halt
            debug!(%reason, "refill timer observed decode failure");
        }
        std::thread::sleep(interval);
    }
}
