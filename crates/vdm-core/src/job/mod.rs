//! Cancellable, pausable, progress-tracked jobs.
//!
//! A [`JobController`] drives an external [`WorkOperation`] on its own worker
//! thread: it enumerates the work once, runs the transfer (waiting and
//! retrying when rate limited), folds per-item progress into one aggregate
//! percentage, and reports through a [`JobSink`]. Lifecycle:
//!
//! ```text
//! Pending --start--> Running <--pause/resume--> Paused
//! Running/Paused --> Finished | Failed | Stopped (terminal)
//! ```

mod backoff;
mod controller;
mod error;
mod progress;
mod sink;
mod status;
mod work;

pub use backoff::{RateLimitBackoff, WaitOutcome};
pub use controller::{JobController, JobSettings, JobSnapshot, ProgressHook};
pub use error::{classify_failure, EnumerationError, FailureKind, ProgressParseError, TransferFailure};
pub use progress::{parse_percent, ProgressPhase, ProgressTracker};
pub use sink::{ChannelSink, JobEvent, JobSink};
pub use status::JobStatus;
pub use work::{Enumeration, WorkDescriptor, WorkOperation};
