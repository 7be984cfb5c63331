//! Integration tests: drive `JobController` with a scripted operation and
//! check lifecycle, aggregate progress and the terminal-event guarantees.

mod common;

use common::scripted_op::{Attempt, Outcome, ScriptedOp, Step};
use common::{
    assert_close, collect_until_terminal, count_completed, count_failed, fast_settings,
    progress_values,
};
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vdm_core::job::{
    ChannelSink, JobController, JobEvent, JobSettings, JobStatus, RateLimitBackoff, WorkDescriptor,
};

const TIMEOUT: Duration = Duration::from_secs(5);

fn work() -> WorkDescriptor {
    WorkDescriptor::new("https://example.com/watch?v=abc", "/tmp/vdm-test")
}

fn spawn(op: Arc<ScriptedOp>, settings: JobSettings) -> (JobController, Receiver<JobEvent>) {
    spawn_with(work(), op, settings)
}

fn spawn_with(
    work: WorkDescriptor,
    op: Arc<ScriptedOp>,
    settings: JobSettings,
) -> (JobController, Receiver<JobEvent>) {
    let (sink, rx) = ChannelSink::pair();
    let job = JobController::new(work, op, Arc::new(sink), settings);
    (job, rx)
}

fn wait_for<F: Fn() -> bool>(cond: F) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn next_event(rx: &Receiver<JobEvent>) -> JobEvent {
    rx.recv_timeout(TIMEOUT).expect("event")
}

#[test]
fn single_item_reports_progress_then_completes_once() {
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(vec![Step::Progress("37.5%"), Step::ItemDone], Outcome::Ok)],
    ));
    let (job, rx) = spawn(op, fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_close(&progress_values(&events), &[37.5, 100.0]);
    assert_eq!(count_completed(&events), 1);
    assert_eq!(events.last(), Some(&JobEvent::Completed));

    let snap = job.wait(Some(TIMEOUT));
    assert_eq!(snap.status, JobStatus::Finished);
    assert_eq!(snap.completed_items, 1);
    assert_eq!(snap.aggregate, 100.0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn playlist_progress_is_weighted_across_items() {
    let steps = (0..3)
        .flat_map(|_| [Step::Progress("50"), Step::ItemDone])
        .collect();
    let op = Arc::new(ScriptedOp::new(3, vec![Attempt::new(steps, Outcome::Ok)]));
    let (job, rx) = spawn(op, fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_close(
        &progress_values(&events),
        &[16.7, 33.3, 50.0, 66.7, 83.3, 100.0],
    );
    assert_eq!(count_completed(&events), 1);
    let snap = job.wait(Some(TIMEOUT));
    assert_eq!(snap.item_count, Some(3));
    assert_eq!(snap.completed_items, 3);
}

#[test]
fn colour_codes_are_stripped_and_garbage_is_ignored() {
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(
            vec![
                Step::Progress("N/A"),
                Step::Progress("\x1b[32m45.2%\x1b[0m"),
                Step::Progress("Unknown%"),
                Step::ItemDone,
            ],
            Outcome::Ok,
        )],
    ));
    let (job, rx) = spawn(op, fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_close(&progress_values(&events), &[45.2, 100.0]);
    assert_eq!(count_failed(&events), 0);
}

#[test]
fn progress_never_decreases() {
    let op = Arc::new(ScriptedOp::new(
        2,
        vec![Attempt::new(
            vec![
                Step::Progress("40"),
                Step::Progress("20"),
                Step::Progress("90"),
                Step::ItemDone,
                Step::ItemDone,
                Step::ItemDone,
                Step::Progress("10"),
            ],
            Outcome::Ok,
        )],
    ));
    let (job, rx) = spawn(op, fast_settings());
    job.start().unwrap();

    let values = progress_values(&collect_until_terminal(&rx, TIMEOUT));
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
    assert_eq!(values.last(), Some(&100.0));
    let snap = job.wait(Some(TIMEOUT));
    assert_eq!(snap.completed_items, 2);
}

#[test]
fn enumeration_failure_fails_once_without_transfer() {
    let op = Arc::new(ScriptedOp::failing_enumeration("Unsupported URL"));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_eq!(events, vec![JobEvent::Failed("Unsupported URL".to_string())]);
    let snap = job.wait(Some(TIMEOUT));
    assert_eq!(snap.status, JobStatus::Failed);
    assert_eq!(op.transfers(), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn fatal_transfer_error_is_not_retried() {
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(
            vec![Step::Progress("12")],
            Outcome::Fail("HTTP Error 403: Forbidden"),
        )],
    ));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_eq!(count_failed(&events), 1);
    assert_eq!(count_completed(&events), 0);
    assert_eq!(
        events.last(),
        Some(&JobEvent::Failed("HTTP Error 403: Forbidden".to_string()))
    );
    assert_eq!(job.wait(Some(TIMEOUT)).status, JobStatus::Failed);
    assert_eq!(op.transfers(), 1);
}

#[test]
fn rate_limit_then_success_completes_once_and_keeps_items() {
    let op = Arc::new(ScriptedOp::new(
        2,
        vec![
            Attempt::new(vec![Step::Progress("100"), Step::ItemDone], Outcome::RateLimited),
            Attempt::new(vec![Step::Progress("50"), Step::ItemDone], Outcome::Ok),
        ],
    ));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_eq!(count_completed(&events), 1);
    assert_eq!(count_failed(&events), 0);
    assert!(events.iter().any(|e| matches!(e, JobEvent::Notice(m) if m.contains("429"))));
    assert_close(&progress_values(&events), &[50.0, 75.0, 100.0]);

    let snap = job.wait(Some(TIMEOUT));
    assert_eq!(snap.status, JobStatus::Finished);
    assert_eq!(snap.completed_items, 2);
    assert_eq!(snap.retry_deadline, None);
    assert_eq!(op.transfers(), 2);
}

#[test]
fn repeated_rate_limits_retry_without_bound() {
    let attempts = (0..4)
        .map(|_| Attempt::new(Vec::new(), Outcome::RateLimited))
        .chain([Attempt::new(vec![Step::ItemDone], Outcome::Ok)])
        .collect();
    let op = Arc::new(ScriptedOp::new(1, attempts));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    let notices = events.iter().filter(|e| matches!(e, JobEvent::Notice(_))).count();
    assert_eq!(notices, 4);
    assert_eq!(count_completed(&events), 1);
    assert_eq!(op.transfers(), 5);
}

#[test]
fn stop_during_backoff_ends_stopped_promptly() {
    let settings = JobSettings {
        backoff: RateLimitBackoff {
            window: Duration::from_secs(60),
            tick: Duration::from_millis(10),
        },
        ..fast_settings()
    };
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(vec![Step::Progress("30")], Outcome::RateLimited)],
    ));
    let (job, rx) = spawn(Arc::clone(&op), settings);
    job.start().unwrap();

    wait_for(|| job.snapshot().retry_deadline.is_some());
    let started = Instant::now();
    assert_eq!(job.stop(), JobStatus::Stopped);
    assert!(started.elapsed() < settings.stop_grace);

    let snap = job.wait(Some(TIMEOUT));
    assert_eq!(snap.status, JobStatus::Stopped);
    assert_eq!(snap.retry_deadline, None);
    let events: Vec<JobEvent> = rx.try_iter().collect();
    assert_eq!(count_completed(&events), 0);
    assert_eq!(count_failed(&events), 0);
    assert_eq!(op.transfers(), 1);
    assert!(!op.force_aborted.load(Ordering::SeqCst));
}

#[test]
fn stop_while_running_discards_late_success() {
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(
            vec![Step::Progress("20"), Step::UntilStopped, Step::Progress("90"), Step::ItemDone],
            Outcome::Ok,
        )],
    ));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();

    assert_eq!(next_event(&rx), JobEvent::Progress(20.0));
    assert_eq!(job.stop(), JobStatus::Stopped);
    assert_eq!(job.wait(Some(TIMEOUT)).status, JobStatus::Stopped);

    assert!(rx.try_recv().is_err(), "no events after stop");
    assert_eq!(op.refused_reports.load(Ordering::SeqCst), 2);
}

#[test]
fn pause_blocks_progress_until_resume() {
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(
            vec![Step::Progress("10"), Step::Gate, Step::Progress("60"), Step::ItemDone],
            Outcome::Ok,
        )],
    ));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();
    assert_eq!(next_event(&rx), JobEvent::Progress(10.0));

    assert!(job.pause());
    assert_eq!(job.status(), JobStatus::Paused);
    op.open_gate();
    std::thread::sleep(Duration::from_millis(60));
    assert!(rx.try_recv().is_err(), "paused job must not report");
    assert_eq!(job.snapshot().aggregate, 10.0);

    assert!(job.resume());
    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_close(&progress_values(&events), &[60.0, 100.0]);
    assert_eq!(count_completed(&events), 1);
}

#[test]
fn pause_then_resume_leaves_progress_unchanged() {
    let op = Arc::new(ScriptedOp::new(
        2,
        vec![Attempt::new(vec![Step::Progress("50"), Step::Gate], Outcome::Ok)],
    ));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();
    assert_eq!(next_event(&rx), JobEvent::Progress(25.0));

    let before = job.snapshot();
    assert!(job.pause());
    assert!(!job.pause(), "already paused");
    assert!(job.resume());
    assert!(!job.resume(), "already running");
    let after = job.snapshot();
    assert_eq!(before.aggregate, after.aggregate);
    assert_eq!(before.completed_items, after.completed_items);
    assert_eq!(after.status, JobStatus::Running);

    op.open_gate();
    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_eq!(count_completed(&events), 1);
}

#[test]
fn stop_while_paused_is_prompt_and_silent() {
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(
            vec![Step::Progress("10"), Step::Gate, Step::Progress("60")],
            Outcome::Ok,
        )],
    ));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();
    assert_eq!(next_event(&rx), JobEvent::Progress(10.0));
    assert!(job.pause());
    op.open_gate();

    let started = Instant::now();
    assert_eq!(job.stop(), JobStatus::Stopped);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(job.wait(Some(TIMEOUT)).status, JobStatus::Stopped);
    assert!(rx.try_recv().is_err());
    assert!(!job.resume());
}

#[test]
fn unresponsive_operation_is_force_aborted() {
    let settings = JobSettings {
        stop_grace: Duration::from_millis(50),
        ..fast_settings()
    };
    let op = Arc::new(ScriptedOp::new(
        1,
        vec![Attempt::new(vec![Step::Progress("5"), Step::UntilForceAborted], Outcome::Ok)],
    ));
    let (job, rx) = spawn(Arc::clone(&op), settings);
    job.start().unwrap();
    assert_eq!(next_event(&rx), JobEvent::Progress(5.0));

    assert_eq!(job.stop(), JobStatus::Stopped);
    assert!(op.force_aborted.load(Ordering::SeqCst));
    assert_eq!(job.wait(Some(TIMEOUT)).status, JobStatus::Stopped);
    assert!(rx.try_recv().is_err());
}

#[test]
fn stop_before_start_is_terminal() {
    let op = Arc::new(ScriptedOp::new(1, Vec::new()));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    assert_eq!(job.status(), JobStatus::Pending);
    assert_eq!(job.stop(), JobStatus::Stopped);
    job.start().unwrap();
    assert_eq!(job.status(), JobStatus::Stopped);
    assert_eq!(op.transfers(), 0);
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn control_calls_after_finish_are_no_ops() {
    let op = Arc::new(ScriptedOp::new(1, vec![Attempt::new(vec![Step::ItemDone], Outcome::Ok)]));
    let (job, rx) = spawn(op, fast_settings());
    job.start().unwrap();
    collect_until_terminal(&rx, TIMEOUT);
    job.wait(Some(TIMEOUT));

    assert!(!job.pause());
    assert!(!job.resume());
    assert_eq!(job.stop(), JobStatus::Finished);
    job.start().unwrap();
    assert_eq!(job.status(), JobStatus::Finished);
    assert!(rx.try_recv().is_err());
}

#[test]
fn subtitle_failure_is_only_a_notice() {
    let op = Arc::new(
        ScriptedOp::new(1, vec![Attempt::new(vec![Step::ItemDone], Outcome::Ok)])
            .with_subtitle_failure("no subtitles for fr"),
    );
    let work = work().with_subtitles(["fr"]);
    let (job, rx) = spawn_with(work, Arc::clone(&op), fast_settings());
    job.start().unwrap();

    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_eq!(count_failed(&events), 0);
    assert_eq!(count_completed(&events), 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::Notice(m) if m.contains("no subtitles for fr"))));
    assert_eq!(op.subtitle_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn subtitles_skipped_when_not_requested() {
    let op = Arc::new(ScriptedOp::new(1, Vec::new()));
    let (job, rx) = spawn(Arc::clone(&op), fast_settings());
    job.start().unwrap();
    let events = collect_until_terminal(&rx, TIMEOUT);
    assert_eq!(events, vec![JobEvent::Progress(100.0), JobEvent::Completed]);
    assert_eq!(op.subtitle_calls.load(Ordering::SeqCst), 0);
}
