//! Child-process plumbing shared by the yt-dlp and ffmpeg operations:
//! stream stdout line by line, keep the tail of stderr, and let another
//! thread kill the child.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};

/// Number of stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// What the line callback wants after seeing a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineFlow {
    Continue,
    Abort,
}

/// How a streamed child ended.
#[derive(Debug)]
pub(crate) struct StreamOutcome {
    /// `None` when the child was killed by [`ChildSlot::kill`] from another thread.
    pub status: Option<ExitStatus>,
    /// True when the line callback asked to abort.
    pub aborted: bool,
    pub stderr_tail: Vec<String>,
}

impl StreamOutcome {
    pub(crate) fn success(&self) -> bool {
        !self.aborted && self.status.is_some_and(|s| s.success())
    }

    /// Best error message from stderr: the last `ERROR:` line, else the last
    /// non-empty line, else the exit status.
    pub(crate) fn error_message(&self) -> String {
        let errors = self
            .stderr_tail
            .iter()
            .rev()
            .find(|l| l.trim_start().starts_with("ERROR:"));
        if let Some(line) = errors.or_else(|| self.stderr_tail.iter().rev().find(|l| !l.trim().is_empty())) {
            return line.trim().to_string();
        }
        match self.status {
            Some(status) => format!("process exited with {status}"),
            None => "process was killed".to_string(),
        }
    }
}

/// The currently running child of an operation, reachable from other threads.
#[derive(Debug, Default)]
pub(crate) struct ChildSlot {
    child: Mutex<Option<Child>>,
}

impl ChildSlot {
    fn put(&self, child: Child) {
        *self.child.lock().unwrap_or_else(PoisonError::into_inner) = Some(child);
    }

    fn take(&self) -> Option<Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Ask the running child to exit (SIGTERM on unix, kill elsewhere).
    pub(crate) fn terminate(&self) {
        let mut slot = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = slot.as_mut() {
            terminate_child(child);
        }
    }

    /// Kill the running child and forget it.
    pub(crate) fn kill(&self) {
        if let Some(mut child) = self.take() {
            if let Err(e) = child.kill() {
                tracing::debug!("kill child {}: {}", child.id(), e);
            }
            let _ = child.wait();
        }
    }
}

#[cfg(unix)]
fn terminate_child(child: &mut Child) {
    // SAFETY: plain signal delivery to a pid we spawned and have not reaped.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate_child(child: &mut Child) {
    let _ = child.kill();
}

fn collect_tail<R: Read>(reader: R) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(reader).lines().map_while(std::result::Result::ok) {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect()
}

/// Spawn `cmd`, feed each stdout line to `on_line`, and wait for the child.
///
/// The child is parked in `slot` while it runs so [`ChildSlot::kill`] can tear
/// it down from another thread. When `on_line` returns [`LineFlow::Abort`] the
/// child is terminated and the outcome is marked aborted.
pub(crate) fn run_streaming<F>(mut cmd: Command, slot: &ChildSlot, mut on_line: F) -> Result<StreamOutcome>
where
    F: FnMut(&str) -> LineFlow,
{
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd.spawn().with_context(|| format!("failed to run {program}"))?;
    tracing::debug!(program = %program, pid = child.id(), "spawned child");

    let stdout = child.stdout.take().context("child stdout not captured")?;
    let stderr = child.stderr.take().context("child stderr not captured")?;
    let stderr_reader = std::thread::Builder::new()
        .name("vdm-stderr".to_string())
        .spawn(move || collect_tail(stderr))
        .context("spawn stderr reader")?;
    slot.put(child);

    let mut aborted = false;
    for line in BufReader::new(stdout).lines() {
        let Ok(line) = line else { break };
        if on_line(&line) == LineFlow::Abort {
            aborted = true;
            slot.terminate();
            break;
        }
    }

    let status = match slot.take() {
        Some(mut child) => Some(child.wait().context("wait for child")?),
        None => None,
    };
    // Grandchildren of a torn-down child may keep stderr open; don't wait on them.
    let stderr_tail = if aborted || status.is_none() {
        Vec::new()
    } else {
        stderr_reader.join().unwrap_or_default()
    };
    Ok(StreamOutcome {
        status,
        aborted,
        stderr_tail,
    })
}
