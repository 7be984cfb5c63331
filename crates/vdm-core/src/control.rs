//! Job control registry: running jobs by id, plus the control socket path.
//!
//! `vdm get` registers each job it starts. A control client (e.g. `vdm pause 2`
//! through the socket) looks the job up here and calls into its controller.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::job::{JobController, JobSnapshot, JobStatus};

/// A control command addressed to one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Pause(u64),
    Resume(u64),
    Stop(u64),
}

impl ControlCommand {
    /// Parse one protocol line: `pause <id>`, `resume <id>` or `stop <id>`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?;
        let id = parts.next()?.parse::<u64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        match verb {
            "pause" => Some(ControlCommand::Pause(id)),
            "resume" => Some(ControlCommand::Resume(id)),
            "stop" | "cancel" => Some(ControlCommand::Stop(id)),
            _ => None,
        }
    }

    pub fn to_line(self) -> String {
        match self {
            ControlCommand::Pause(id) => format!("pause {id}\n"),
            ControlCommand::Resume(id) => format!("resume {id}\n"),
            ControlCommand::Stop(id) => format!("stop {id}\n"),
        }
    }
}

/// Shared registry of job id -> controller.
#[derive(Default)]
pub struct JobControl {
    next_id: AtomicU64,
    jobs: RwLock<BTreeMap<u64, Arc<JobController>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job and return its id (ids start at 1).
    pub fn register(&self, job: Arc<JobController>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, job);
        id
    }

    /// Unregister a job (call once its terminal event has been observed).
    pub fn unregister(&self, id: u64) -> Option<Arc<JobController>> {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<Arc<JobController>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn snapshots(&self) -> Vec<(u64, JobSnapshot)> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, job)| (*id, job.snapshot()))
            .collect()
    }

    /// Apply a command. Returns `None` if the id is unknown, otherwise the
    /// job's status after the call. `Stop` blocks for up to the job's grace period.
    pub fn apply(&self, command: ControlCommand) -> Option<JobStatus> {
        match command {
            ControlCommand::Pause(id) => {
                let job = self.get(id)?;
                job.pause();
                Some(job.status())
            }
            ControlCommand::Resume(id) => {
                let job = self.get(id)?;
                job.resume();
                Some(job.status())
            }
            ControlCommand::Stop(id) => Some(self.get(id)?.stop()),
        }
    }

    /// Stop every registered job.
    pub fn stop_all(&self) {
        let jobs: Vec<Arc<JobController>> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for job in jobs {
            job.stop();
        }
    }
}

/// Default path for the control socket (XDG state dir).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("vdm")?.get_state_home();
    Ok(dir.join("control.sock"))
}
