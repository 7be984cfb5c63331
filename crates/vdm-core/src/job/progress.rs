//! Aggregate progress across the sub-items of a job, and parsing of the
//! percentage text reported by external operations.

use regex::Regex;
use std::sync::OnceLock;

use super::error::ProgressParseError;

/// Phase reported by an external operation through the progress hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    /// The in-flight sub-item advanced; the text carries its percentage.
    Progressing,
    /// The in-flight sub-item finished.
    ItemComplete,
}

fn ansi_sgr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static regex"))
}

/// Parse a percentage such as `" 45.2%"` or `"\x1b[32m45.2%\x1b[0m"`.
///
/// Colour escape sequences, whitespace and the percent sign are stripped
/// before parsing. The result is clamped to `[0, 100]`.
pub fn parse_percent(text: &str) -> Result<f64, ProgressParseError> {
    let stripped = ansi_sgr().replace_all(text, "");
    let cleaned = stripped.trim().trim_end_matches('%').trim();
    let value: f64 = cleaned
        .parse()
        .map_err(|_| ProgressParseError::new(text))?;
    if !value.is_finite() {
        return Err(ProgressParseError::new(text));
    }
    Ok(value.clamp(0.0, 100.0))
}

/// Counters behind a job's aggregate percentage.
///
/// `aggregate = (completed_items * 100 + current_fraction) / item_count`.
/// The emitted aggregate never decreases: an update that would lower it is
/// rejected without touching any counter.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    item_count: usize,
    completed_items: usize,
    current_fraction: f64,
    last_emitted: Option<f64>,
}

impl ProgressTracker {
    /// `item_count` is clamped to at least 1.
    pub fn new(item_count: usize) -> Self {
        Self {
            item_count: item_count.max(1),
            completed_items: 0,
            current_fraction: 0.0,
            last_emitted: None,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn completed_items(&self) -> usize {
        self.completed_items
    }

    pub fn current_fraction(&self) -> f64 {
        self.current_fraction
    }

    /// Last value handed to the sink, if any.
    pub fn last_emitted(&self) -> Option<f64> {
        self.last_emitted
    }

    /// Aggregate percentage in `[0, 100]`.
    pub fn aggregate(&self) -> f64 {
        Self::compute(self.item_count, self.completed_items, self.current_fraction)
    }

    fn compute(item_count: usize, completed: usize, fraction: f64) -> f64 {
        let raw = (completed as f64 * 100.0 + fraction) / item_count as f64;
        raw.min(100.0)
    }

    /// Record progress of the in-flight sub-item. Returns the aggregate to
    /// emit, or `None` when the update was rejected or would repeat the last
    /// emitted value.
    pub fn on_progressing(&mut self, fraction: f64) -> Option<f64> {
        if self.completed_items >= self.item_count {
            return None;
        }
        let fraction = fraction.clamp(0.0, 100.0);
        let candidate = Self::compute(self.item_count, self.completed_items, fraction);
        if self.last_emitted.is_some_and(|last| candidate <= last) {
            return None;
        }
        self.current_fraction = fraction;
        self.last_emitted = Some(candidate);
        Some(candidate)
    }

    /// Record completion of the in-flight sub-item. Extra completions beyond
    /// `item_count` are ignored. The counter always advances; the aggregate
    /// is returned only when it rose (an item already reported at 100% does
    /// not emit twice).
    pub fn on_item_complete(&mut self) -> Option<f64> {
        if self.completed_items >= self.item_count {
            return None;
        }
        self.completed_items += 1;
        self.current_fraction = 0.0;
        let value = self.aggregate();
        if self.last_emitted.is_some_and(|last| value <= last) {
            return None;
        }
        self.last_emitted = Some(value);
        Some(value)
    }

    /// Force the final 100% (normal completion). Returns `None` if 100 was
    /// already the last emitted value.
    pub fn finish(&mut self) -> Option<f64> {
        self.completed_items = self.item_count;
        self.current_fraction = 0.0;
        if self.last_emitted == Some(100.0) {
            return None;
        }
        self.last_emitted = Some(100.0);
        Some(100.0)
    }
}
