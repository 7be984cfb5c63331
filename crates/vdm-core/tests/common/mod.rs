#![allow(dead_code)]

pub mod http_server;
pub mod scripted_op;

use std::sync::mpsc::Receiver;
use std::time::Duration;
use vdm_core::job::{JobEvent, JobSettings, RateLimitBackoff};

/// Fast timings so tests don't sit through real backoff windows.
pub fn fast_settings() -> JobSettings {
    JobSettings {
        backoff: RateLimitBackoff {
            window: Duration::from_millis(30),
            tick: Duration::from_millis(5),
        },
        poll_interval: Duration::from_millis(5),
        stop_grace: Duration::from_secs(2),
    }
}

/// Receive events until a terminal one arrives (inclusive) or `timeout` passes.
pub fn collect_until_terminal(rx: &Receiver<JobEvent>, timeout: Duration) -> Vec<JobEvent> {
    let deadline = std::time::Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(left) = deadline.checked_duration_since(std::time::Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    events
}

/// Progress values among `events`, in order.
pub fn progress_values(events: &[JobEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect()
}

pub fn count_completed(events: &[JobEvent]) -> usize {
    events.iter().filter(|e| matches!(e, JobEvent::Completed)).count()
}

pub fn count_failed(events: &[JobEvent]) -> usize {
    events.iter().filter(|e| matches!(e, JobEvent::Failed(_))).count()
}

pub fn assert_close(got: &[f64], want: &[f64]) {
    assert_eq!(got.len(), want.len(), "got {got:?}, want {want:?}");
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() < 0.05, "got {got:?}, want {want:?}");
    }
}
