//! Terminal progress bars fed by job notifications.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::{Mutex, PoisonError};
use vdm_core::job::JobSink;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:30.cyan/blue}] {pos:>3}% {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// A [`JobSink`] that drives one progress bar and remembers the failure
/// message, if any, for the final summary.
pub struct BarSink {
    bar: ProgressBar,
    failure: Mutex<Option<String>>,
}

impl BarSink {
    /// Add a bar for one job to `multi`.
    pub fn new(multi: &MultiProgress, prefix: &str, label: &str) -> Self {
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(bar_style());
        bar.set_prefix(prefix.to_string());
        bar.set_message(label.to_string());
        Self {
            bar,
            failure: Mutex::new(None),
        }
    }

    pub fn set_prefix(&self, prefix: String) {
        self.bar.set_prefix(prefix);
    }

    pub fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Close the bar of a job that ended without a terminal notification.
    pub fn abandon(&self, message: &str) {
        if !self.bar.is_finished() {
            self.bar.abandon_with_message(message.to_string());
        }
    }
}

impl JobSink for BarSink {
    fn progress(&self, percent: f64) {
        self.bar.set_position(percent.round() as u64);
    }

    fn notice(&self, message: &str) {
        self.bar.println(format!("{}: {message}", self.bar.prefix()));
    }

    fn completed(&self) {
        self.bar.finish_with_message("done");
    }

    fn failed(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
        self.bar.abandon_with_message(format!("failed: {message}"));
    }
}
