//! Job controller: runs one external operation on a dedicated worker thread
//! with pause/resume/stop, rate-limit retry and aggregate progress.
//!
//! Every notification is emitted while holding the state lock and only if the
//! job is not terminal; `stop()` flips the status under the same lock, so once
//! `stop()` has returned the sink sees nothing more from this job.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::backoff::{RateLimitBackoff, WaitOutcome};
use super::error::TransferFailure;
use super::progress::{parse_percent, ProgressPhase, ProgressTracker};
use super::sink::JobSink;
use super::status::JobStatus;
use super::work::{WorkDescriptor, WorkOperation};

/// How often `stop()`/`wait()` check whether the worker has exited.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Timing knobs for a job.
#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    /// Wait applied after a rate-limit signal before retrying.
    pub backoff: RateLimitBackoff,
    /// Sleep increment while paused.
    pub poll_interval: Duration,
    /// How long `stop()` waits for cooperative shutdown before forcing it.
    pub stop_grace: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            backoff: RateLimitBackoff::default(),
            poll_interval: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Point-in-time view of a job for callers.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub title: Option<String>,
    /// `None` until enumeration has completed.
    pub item_count: Option<usize>,
    pub completed_items: usize,
    pub current_fraction: f64,
    pub aggregate: f64,
    /// Set only while waiting to retry after rate limiting.
    pub retry_deadline: Option<Instant>,
}

struct State {
    status: JobStatus,
    title: Option<String>,
    tracker: Option<ProgressTracker>,
    retry_deadline: Option<Instant>,
}

struct Shared {
    state: Mutex<State>,
    paused: AtomicBool,
    stopped: AtomicBool,
    sink: Arc<dyn JobSink>,
    settings: JobSettings,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        let tracker = state.tracker.as_ref();
        JobSnapshot {
            status: state.status,
            title: state.title.clone(),
            item_count: tracker.map(ProgressTracker::item_count),
            completed_items: tracker.map_or(0, ProgressTracker::completed_items),
            current_fraction: tracker.map_or(0.0, ProgressTracker::current_fraction),
            aggregate: tracker.map_or(0.0, ProgressTracker::aggregate),
            retry_deadline: state.retry_deadline,
        }
    }

    /// Sleep in poll increments while paused. Returns false if stopped.
    fn wait_while_paused(&self) -> bool {
        while self.paused.load(Ordering::SeqCst) {
            if self.is_stopped() {
                return false;
            }
            std::thread::sleep(self.settings.poll_interval);
        }
        !self.is_stopped()
    }

    fn update_progress(&self, f: impl FnOnce(&mut ProgressTracker) -> Option<f64>) {
        let mut state = self.lock();
        if state.status.is_terminal() {
            return;
        }
        let Some(tracker) = state.tracker.as_mut() else {
            return;
        };
        if let Some(value) = f(tracker) {
            tracing::trace!(progress = value, "job progress");
            self.sink.progress(value);
        }
    }

    fn notice(&self, message: &str) -> bool {
        let state = self.lock();
        if state.status.is_terminal() {
            return false;
        }
        self.sink.notice(message);
        true
    }

    fn begin_retry_wait(&self, message: &str, deadline: Instant) -> bool {
        let mut state = self.lock();
        if state.status.is_terminal() {
            return false;
        }
        state.retry_deadline = Some(deadline);
        let secs = self.settings.backoff.window.as_secs_f64();
        self.sink
            .notice(&format!("too many requests, retrying in {secs:.0}s: {message}"));
        true
    }

    fn end_retry_wait(&self) {
        self.lock().retry_deadline = None;
    }

    fn fail(&self, message: &str) {
        let mut state = self.lock();
        if state.status.is_terminal() {
            return;
        }
        state.status = JobStatus::Failed;
        state.retry_deadline = None;
        self.paused.store(false, Ordering::SeqCst);
        tracing::warn!(error = %message, "job failed");
        self.sink.failed(message);
    }

    fn finish(&self) {
        let mut state = self.lock();
        if state.status.is_terminal() {
            return;
        }
        state.status = JobStatus::Finished;
        state.retry_deadline = None;
        self.paused.store(false, Ordering::SeqCst);
        let tracker = state.tracker.get_or_insert_with(|| ProgressTracker::new(1));
        if let Some(value) = tracker.finish() {
            self.sink.progress(value);
        }
        tracing::info!("job finished");
        self.sink.completed();
    }
}

/// Handle given to a [`WorkOperation`] for reporting progress.
///
/// Calls block while the job is paused. After the job is stopped, reports are
/// discarded and [`ProgressHook::report`] returns `false`.
pub struct ProgressHook {
    shared: Arc<Shared>,
}

impl ProgressHook {
    /// Report a phase with its percentage text (ignored for `ItemComplete`).
    /// Returns whether the operation should keep going.
    pub fn report(&self, phase: ProgressPhase, text: &str) -> bool {
        if !self.shared.wait_while_paused() {
            return false;
        }
        match phase {
            ProgressPhase::Progressing => match parse_percent(text) {
                Ok(fraction) => self.shared.update_progress(|t| t.on_progressing(fraction)),
                Err(e) => tracing::trace!("{}", e),
            },
            ProgressPhase::ItemComplete => self.shared.update_progress(ProgressTracker::on_item_complete),
        }
        !self.shared.is_stopped()
    }

    /// True once `stop()` has been requested.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }
}

/// Controller for one job. Create with [`JobController::new`], then
/// [`JobController::start`]. Control calls are safe from any thread.
pub struct JobController {
    work: WorkDescriptor,
    op: Arc<dyn WorkOperation>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobController {
    pub fn new(
        work: WorkDescriptor,
        op: Arc<dyn WorkOperation>,
        sink: Arc<dyn JobSink>,
        settings: JobSettings,
    ) -> Self {
        Self {
            work,
            op,
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    status: JobStatus::Pending,
                    title: None,
                    tracker: None,
                    retry_deadline: None,
                }),
                paused: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                sink,
                settings,
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn work(&self) -> &WorkDescriptor {
        &self.work
    }

    pub fn status(&self) -> JobStatus {
        self.shared.lock().status
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.snapshot()
    }

    /// Pending → Running: spawn the worker thread. No-op in any other state.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.shared.lock();
            if state.status != JobStatus::Pending {
                return Ok(());
            }
            state.status = JobStatus::Running;
        }
        tracing::info!(source = %self.work.source, "job started");

        let shared = Arc::clone(&self.shared);
        let op = Arc::clone(&self.op);
        let work = self.work.clone();
        let spawned = std::thread::Builder::new()
            .name("vdm-job".to_string())
            .spawn(move || run_job(shared, op, work));
        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.fail(&format!("could not start worker: {e}"));
                Err(e).context("spawn job worker thread")
            }
        }
    }

    /// Running → Paused. Returns whether the transition happened.
    pub fn pause(&self) -> bool {
        let mut state = self.shared.lock();
        if state.status != JobStatus::Running {
            return false;
        }
        state.status = JobStatus::Paused;
        self.shared.paused.store(true, Ordering::SeqCst);
        tracing::info!(source = %self.work.source, "job paused");
        true
    }

    /// Paused → Running. Returns whether the transition happened.
    pub fn resume(&self) -> bool {
        let mut state = self.shared.lock();
        if state.status != JobStatus::Paused {
            return false;
        }
        state.status = JobStatus::Running;
        self.shared.paused.store(false, Ordering::SeqCst);
        tracing::info!(source = %self.work.source, "job resumed");
        true
    }

    /// Any non-terminal state → Stopped.
    ///
    /// Blocks for up to the grace period while the worker winds down; if it
    /// is still running afterwards, the operation is force-aborted and the
    /// worker detached. Output already written is left in place.
    pub fn stop(&self) -> JobStatus {
        {
            let mut state = self.shared.lock();
            if state.status.is_terminal() {
                return state.status;
            }
            state.status = JobStatus::Stopped;
            state.retry_deadline = None;
            self.shared.stopped.store(true, Ordering::SeqCst);
            self.shared.paused.store(false, Ordering::SeqCst);
        }
        tracing::info!(source = %self.work.source, "job stopped");

        let grace = self.shared.settings.stop_grace;
        if !self.join_within(grace) {
            tracing::warn!(
                source = %self.work.source,
                grace_secs = grace.as_secs_f64(),
                "worker ignored stop request; forcing abort"
            );
            self.op.force_abort();
            if !self.join_within(grace) {
                tracing::warn!(source = %self.work.source, "detaching unresponsive worker");
                self.worker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
            }
        }
        JobStatus::Stopped
    }

    /// Block until the worker exits or `timeout` elapses (`None` = forever),
    /// then return the current snapshot.
    pub fn wait(&self, timeout: Option<Duration>) -> JobSnapshot {
        match timeout {
            Some(t) => {
                self.join_within(t);
            }
            None => {
                let handle = self
                    .worker
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(handle) = handle {
                    if handle.join().is_err() {
                        self.shared.fail("job worker panicked");
                    }
                }
            }
        }
        self.snapshot()
    }

    /// Poll the worker until it exits or `limit` passes. Returns true when no
    /// worker is left running.
    fn join_within(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            let finished = match slot.as_ref() {
                None => return true,
                Some(handle) => handle.is_finished(),
            };
            if finished {
                let handle = slot.take();
                drop(slot);
                if let Some(handle) = handle {
                    if handle.join().is_err() {
                        self.shared.fail("job worker panicked");
                    }
                }
                return true;
            }
            drop(slot);
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(JOIN_POLL);
        }
    }
}

/// Worker body: enumerate once, then transfer until success, a fatal error,
/// or stop.
fn run_job(shared: Arc<Shared>, op: Arc<dyn WorkOperation>, work: WorkDescriptor) {
    if shared.is_stopped() {
        return;
    }
    let enumeration = match op.enumerate(&work) {
        Ok(e) => e,
        Err(e) => {
            shared.fail(&e.message);
            return;
        }
    };
    {
        let mut state = shared.lock();
        if state.status.is_terminal() {
            return;
        }
        state.tracker = Some(ProgressTracker::new(enumeration.item_count));
        state.title = enumeration.title.clone();
    }
    tracing::debug!(
        source = %work.source,
        items = enumeration.item_count.max(1),
        "enumerated job"
    );

    let hook = ProgressHook {
        shared: Arc::clone(&shared),
    };
    let backoff = shared.settings.backoff;
    let mut attempt = 1u32;
    loop {
        if shared.is_stopped() {
            return;
        }
        match op.transfer(&work, &hook) {
            Ok(()) => break,
            Err(TransferFailure::RateLimited(message)) => {
                if shared.is_stopped() {
                    return;
                }
                tracing::warn!(attempt, error = %message, "rate limited; waiting before retry");
                if !shared.begin_retry_wait(&message, Instant::now() + backoff.window) {
                    return;
                }
                if backoff.wait(&shared.stopped) == WaitOutcome::Stopped {
                    return;
                }
                shared.end_retry_wait();
                attempt += 1;
            }
            Err(TransferFailure::Failed(message)) => {
                if !shared.is_stopped() {
                    shared.fail(&message);
                }
                return;
            }
        }
    }

    if shared.is_stopped() {
        return;
    }
    if !work.subtitle_langs.is_empty() {
        if let Err(e) = op.fetch_subtitles(&work) {
            tracing::warn!(error = %e, "subtitle download failed");
            shared.notice(&format!("subtitles unavailable: {}", e.message()));
        }
    }
    shared.finish();
}
