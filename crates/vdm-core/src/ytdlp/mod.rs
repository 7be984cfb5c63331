//! Media downloads through the `yt-dlp` executable.
//!
//! `YtDlp` is a [`WorkOperation`]: enumeration probes the URL's metadata
//! (listing the whole playlist when one is requested), the transfer streams yt-dlp's progress lines into the job's progress hook,
//! and subtitles are fetched as a separate, non-fatal step.

mod args;
mod probe;

pub use args::{parse_progress_line, quality_selector};
pub use probe::{
    parse_media_info, parse_playlist_summary, qualities_from_heights, MediaInfo, PlaylistSummary,
};

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use crate::job::{
    Enumeration, EnumerationError, ProgressHook, ProgressPhase, TransferFailure, WorkDescriptor,
    WorkOperation,
};
use crate::process::{run_streaming, ChildSlot, LineFlow};

/// Check that a source looks like an http(s) URL before handing it to yt-dlp.
pub fn validate_url(source: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(source.trim()).with_context(|| format!("invalid URL: {source}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => bail!("unsupported URL scheme {other:?}"),
    }
}

/// yt-dlp driven as a child process.
#[derive(Debug)]
pub struct YtDlp {
    program: PathBuf,
    running: ChildSlot,
    /// Files already reported finished during the current job. yt-dlp
    /// re-announces files it skips as already downloaded on a retry.
    completed: Mutex<HashSet<String>>,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            running: ChildSlot::default(),
            completed: Mutex::new(HashSet::new()),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.program)
    }

    /// Resolve display metadata for a URL (title, thumbnail, playlist size,
    /// qualities). Blocks until yt-dlp answers.
    pub fn probe(&self, source: &str) -> Result<MediaInfo> {
        validate_url(source)?;
        let stdout = self.dump_json(args::probe_args(source.trim()))?;
        parse_media_info(&stdout)
    }

    /// Count every entry of a playlist URL. A plain video counts as one.
    pub fn playlist_summary(&self, source: &str) -> Result<PlaylistSummary> {
        validate_url(source)?;
        let stdout = self.dump_json(args::flat_playlist_args(source.trim()))?;
        parse_playlist_summary(&stdout)
    }

    fn dump_json(&self, args: Vec<String>) -> Result<String> {
        let output = self
            .command()
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", self.program.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("yt-dlp probe failed")
                .trim()
                .to_string();
            bail!(message);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Record a finished file; false if it was already reported.
    fn mark_completed(&self, path: &str) -> bool {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.trim().to_string())
    }

    fn run_with_hook(&self, args: Vec<String>, hook: Option<&ProgressHook>) -> Result<(), TransferFailure> {
        let mut cmd = self.command();
        cmd.args(args);
        let outcome = run_streaming(cmd, &self.running, |line| {
            let Some(hook) = hook else {
                return LineFlow::Continue;
            };
            if let Some((phase, text)) = parse_progress_line(line) {
                if phase == ProgressPhase::ItemComplete && !self.mark_completed(text) {
                    tracing::debug!(path = text.trim(), "file already counted");
                    if hook.is_stopped() {
                        return LineFlow::Abort;
                    }
                    return LineFlow::Continue;
                }
                if !hook.report(phase, text) {
                    return LineFlow::Abort;
                }
            } else if hook.is_stopped() {
                return LineFlow::Abort;
            }
            LineFlow::Continue
        })
        .map_err(|e| TransferFailure::Failed(format!("{e:#}")))?;

        if outcome.success() {
            return Ok(());
        }
        if outcome.aborted || outcome.status.is_none() {
            return Err(TransferFailure::Failed("download aborted".to_string()));
        }
        Err(TransferFailure::from_message(outcome.error_message()))
    }
}

impl WorkOperation for YtDlp {
    fn enumerate(&self, work: &WorkDescriptor) -> Result<Enumeration, EnumerationError> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        let to_error = |e: anyhow::Error| EnumerationError::new(format!("{e:#}"));
        if work.playlist {
            let summary = self.playlist_summary(&work.source).map_err(to_error)?;
            return Ok(Enumeration {
                item_count: summary.item_count,
                title: summary.title,
            });
        }
        let info = self.probe(&work.source).map_err(to_error)?;
        Ok(Enumeration {
            item_count: 1,
            title: Some(info.title),
        })
    }

    fn transfer(&self, work: &WorkDescriptor, hook: &ProgressHook) -> Result<(), TransferFailure> {
        tracing::debug!(source = %work.source, quality = %work.quality, "starting yt-dlp transfer");
        self.run_with_hook(args::transfer_args(work), Some(hook))
    }

    fn fetch_subtitles(&self, work: &WorkDescriptor) -> Result<(), TransferFailure> {
        tracing::debug!(source = %work.source, langs = ?work.subtitle_langs, "fetching subtitles");
        self.run_with_hook(args::subtitle_args(work), None)
    }

    fn force_abort(&self) {
        self.running.kill();
    }
}
