//! A `WorkOperation` that plays back a script of progress reports and
//! outcomes, for driving the job controller deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use vdm_core::job::{
    Enumeration, EnumerationError, ProgressHook, ProgressPhase, TransferFailure, WorkDescriptor,
    WorkOperation,
};

#[derive(Debug, Clone)]
pub enum Step {
    /// Report `Progressing` with this text.
    Progress(&'static str),
    /// Report `ItemComplete`.
    ItemDone,
    /// Block until the test opens the gate (or the job is stopped).
    Gate,
    /// Block until the job is stopped, then carry on with the script.
    UntilStopped,
    /// Ignore stop entirely; block until `force_abort` is called.
    UntilForceAborted,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    RateLimited,
    Fail(&'static str),
}

#[derive(Debug, Clone)]
pub struct Attempt {
    pub steps: Vec<Step>,
    pub outcome: Outcome,
}

impl Attempt {
    pub fn new(steps: Vec<Step>, outcome: Outcome) -> Self {
        Self { steps, outcome }
    }
}

pub struct ScriptedOp {
    enumeration: Result<usize, &'static str>,
    attempts: Mutex<VecDeque<Attempt>>,
    subtitles: Result<(), &'static str>,
    gate: AtomicBool,
    pub transfers: AtomicUsize,
    pub subtitle_calls: AtomicUsize,
    pub force_aborted: AtomicBool,
    /// Reports whose hook call returned `false`.
    pub refused_reports: AtomicUsize,
}

impl ScriptedOp {
    pub fn new(item_count: usize, attempts: Vec<Attempt>) -> Self {
        Self {
            enumeration: Ok(item_count),
            attempts: Mutex::new(attempts.into()),
            subtitles: Ok(()),
            gate: AtomicBool::new(false),
            transfers: AtomicUsize::new(0),
            subtitle_calls: AtomicUsize::new(0),
            force_aborted: AtomicBool::new(false),
            refused_reports: AtomicUsize::new(0),
        }
    }

    pub fn failing_enumeration(message: &'static str) -> Self {
        let mut op = Self::new(1, Vec::new());
        op.enumeration = Err(message);
        op
    }

    pub fn with_subtitle_failure(mut self, message: &'static str) -> Self {
        self.subtitles = Err(message);
        self
    }

    pub fn open_gate(&self) {
        self.gate.store(true, Ordering::SeqCst);
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }
}

fn idle() {
    thread::sleep(Duration::from_millis(2));
}

impl WorkOperation for ScriptedOp {
    fn enumerate(&self, _work: &WorkDescriptor) -> Result<Enumeration, EnumerationError> {
        match self.enumeration {
            Ok(n) => Ok(Enumeration {
                item_count: n,
                title: Some("scripted".to_string()),
            }),
            Err(message) => Err(EnumerationError::new(message)),
        }
    }

    fn transfer(&self, _work: &WorkDescriptor, hook: &ProgressHook) -> Result<(), TransferFailure> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        let Some(attempt) = self.attempts.lock().unwrap().pop_front() else {
            return Ok(());
        };
        for step in attempt.steps {
            let keep_going = match step {
                Step::Progress(text) => hook.report(ProgressPhase::Progressing, text),
                Step::ItemDone => hook.report(ProgressPhase::ItemComplete, ""),
                Step::Gate => {
                    while !self.gate.load(Ordering::SeqCst) && !hook.is_stopped() {
                        idle();
                    }
                    true
                }
                Step::UntilStopped => {
                    while !hook.is_stopped() {
                        idle();
                    }
                    true
                }
                Step::UntilForceAborted => {
                    while !self.force_aborted.load(Ordering::SeqCst) {
                        idle();
                    }
                    true
                }
            };
            if !keep_going {
                self.refused_reports.fetch_add(1, Ordering::SeqCst);
            }
        }
        match attempt.outcome {
            Outcome::Ok => Ok(()),
            Outcome::RateLimited => Err(TransferFailure::RateLimited(
                "HTTP Error 429: Too Many Requests".to_string(),
            )),
            Outcome::Fail(message) => Err(TransferFailure::Failed(message.to_string())),
        }
    }

    fn fetch_subtitles(&self, _work: &WorkDescriptor) -> Result<(), TransferFailure> {
        self.subtitle_calls.fetch_add(1, Ordering::SeqCst);
        self.subtitles
            .map_err(|m| TransferFailure::Failed(m.to_string()))
    }

    fn force_abort(&self) {
        self.force_aborted.store(true, Ordering::SeqCst);
    }
}
