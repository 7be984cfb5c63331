//! Fixed-window wait after a rate-limit signal.
//!
//! The wait is sliced into ticks so a stop request is honoured within one
//! tick instead of after the whole window.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How a backoff wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full window elapsed; retry.
    Elapsed,
    /// The stop flag was raised during the wait.
    Stopped,
}

/// Wait window applied before retrying a rate-limited transfer.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBackoff {
    /// Total time to wait before the retry.
    pub window: Duration,
    /// Granularity of stop-flag checks.
    pub tick: Duration,
}

impl Default for RateLimitBackoff {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            tick: Duration::from_secs(1),
        }
    }
}

impl RateLimitBackoff {
    /// Number of ticks making up the window (at least one).
    pub fn ticks(&self) -> u32 {
        if self.tick.is_zero() {
            return 1;
        }
        let n = self.window.as_nanos().div_ceil(self.tick.as_nanos());
        n.clamp(1, u32::MAX as u128) as u32
    }

    /// Sleep for the window, checking `stop` before every tick.
    pub fn wait(&self, stop: &AtomicBool) -> WaitOutcome {
        let tick = self.tick.min(self.window);
        for _ in 0..self.ticks() {
            if stop.load(Ordering::SeqCst) {
                return WaitOutcome::Stopped;
            }
            std::thread::sleep(tick);
        }
        if stop.load(Ordering::SeqCst) {
            WaitOutcome::Stopped
        } else {
            WaitOutcome::Elapsed
        }
    }
}
