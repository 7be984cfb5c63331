//! Observer interface through which a job reports to its caller.

use std::sync::mpsc;

/// Receives a job's notifications. Called on the job's worker thread while
/// the controller holds its state lock: implementations must be quick and
/// must not call back into the controller.
pub trait JobSink: Send + Sync {
    /// Aggregate progress in `[0, 100]`.
    fn progress(&self, percent: f64);

    /// Advisory, non-terminal message (e.g. waiting after rate limiting).
    fn notice(&self, message: &str);

    /// Terminal: the job finished successfully.
    fn completed(&self);

    /// Terminal: the job failed.
    fn failed(&self, message: &str);
}

/// A notification as a value, for channel-based consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(f64),
    Notice(String),
    Completed,
    Failed(String),
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed | JobEvent::Failed(_))
    }
}

/// Forwards notifications into an `mpsc` channel. A dropped receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<JobEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<JobEvent>) -> Self {
        Self { tx }
    }

    /// Convenience: a sink and the receiving end of its channel.
    pub fn pair() -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }
}

impl JobSink for ChannelSink {
    fn progress(&self, percent: f64) {
        let _ = self.tx.send(JobEvent::Progress(percent));
    }

    fn notice(&self, message: &str) {
        let _ = self.tx.send(JobEvent::Notice(message.to_string()));
    }

    fn completed(&self) {
        let _ = self.tx.send(JobEvent::Completed);
    }

    fn failed(&self, message: &str) {
        let _ = self.tx.send(JobEvent::Failed(message.to_string()));
    }
}
