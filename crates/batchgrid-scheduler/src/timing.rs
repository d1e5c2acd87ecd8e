//! Callback timing.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Logs how long a callback took when dropped: a warning past the
/// threshold, a debug line otherwise. Never fails the callback.
pub struct CallbackTimer {
    callback: &'static str,
    threshold: Duration,
    started: Instant,
}

impl CallbackTimer {
    pub fn start(callback: &'static str, threshold: Duration) -> Self {
        Self {
            callback,
            threshold,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for CallbackTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed > self.threshold {
            warn!(
                callback = self.callback,
                elapsed_ms,
                threshold_ms = self.threshold.as_millis() as u64,
                "scheduler callback was slow"
            );
        } else {
            debug!(callback = self.callback, elapsed_ms, "scheduler callback");
        }
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
