//! Local media conversion through `ffmpeg`.
//!
//! A conversion is a one-item job: the descriptor's `source` is the input
//! file, `destination` the output file and `quality` the target format.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use crate::job::{
    Enumeration, EnumerationError, ProgressHook, ProgressPhase, TransferFailure, WorkDescriptor,
    WorkOperation,
};
use crate::process::{run_streaming, ChildSlot, LineFlow};

/// Output formats offered for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Mp4,
    Avi,
    Mkv,
    Mp3,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [
        TargetFormat::Mp4,
        TargetFormat::Avi,
        TargetFormat::Mkv,
        TargetFormat::Mp3,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Mp4 => "mp4",
            TargetFormat::Avi => "avi",
            TargetFormat::Mkv => "mkv",
            TargetFormat::Mp3 => "mp3",
        }
    }

    /// Codec arguments: audio-only MP3, or H.264/AAC for video containers.
    fn codec_args(self) -> &'static [&'static str] {
        match self {
            TargetFormat::Mp3 => &["-vn", "-c:a", "libmp3lame", "-b:a", "192k"],
            _ => &["-c:v", "libx264", "-c:a", "aac"],
        }
    }

    /// Guess from an output path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        TargetFormat::ALL
            .into_iter()
            .find(|f| f.extension() == lower)
            .with_context(|| format!("unsupported format {s:?} (expected mp4, avi, mkv or mp3)"))
    }
}

/// Parse the duration printed by ffprobe (`format=duration`).
pub fn parse_duration_secs(text: &str) -> Result<f64> {
    let secs: f64 = text.trim().parse().context("ffprobe printed no duration")?;
    if !secs.is_finite() || secs <= 0.0 {
        bail!("media has no usable duration ({secs})");
    }
    Ok(secs)
}

/// One line of ffmpeg's `-progress` output, mapped to a hook call.
fn progress_from_line(line: &str, duration_secs: f64) -> Option<(ProgressPhase, String)> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" => {
            let micros: f64 = value.trim().parse().ok()?;
            let pct = (micros / 1_000_000.0 / duration_secs * 100.0).clamp(0.0, 100.0);
            Some((ProgressPhase::Progressing, format!("{pct:.2}%")))
        }
        "progress" if value.trim() == "end" => Some((ProgressPhase::ItemComplete, String::new())),
        _ => None,
    }
}

/// ffmpeg/ffprobe driven as child processes.
#[derive(Debug)]
pub struct Converter {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    running: ChildSlot,
}

impl Converter {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            running: ChildSlot::default(),
        }
    }

    /// Media duration in seconds.
    pub fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(input)
            .output()
            .with_context(|| format!("failed to run {}", self.ffprobe.display()))?;
        if !output.status.success() {
            bail!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_duration_secs(&String::from_utf8_lossy(&output.stdout))
    }
}

impl WorkOperation for Converter {
    fn enumerate(&self, work: &WorkDescriptor) -> Result<Enumeration, EnumerationError> {
        let input = Path::new(&work.source);
        if !input.is_file() {
            return Err(EnumerationError::new(format!(
                "input file not found: {}",
                input.display()
            )));
        }
        work.quality
            .parse::<TargetFormat>()
            .map_err(|e| EnumerationError::new(e.to_string()))?;
        Ok(Enumeration {
            item_count: 1,
            title: input.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }

    fn transfer(&self, work: &WorkDescriptor, hook: &ProgressHook) -> Result<(), TransferFailure> {
        let format: TargetFormat = work
            .quality
            .parse()
            .map_err(|e: anyhow::Error| TransferFailure::Failed(e.to_string()))?;
        let input = Path::new(&work.source);
        let duration = self
            .probe_duration(input)
            .map_err(|e| TransferFailure::Failed(format!("{e:#}")))?;
        tracing::debug!(input = %input.display(), duration, %format, "starting conversion");

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(format.codec_args())
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(&work.destination);

        let outcome = run_streaming(cmd, &self.running, |line| match progress_from_line(line, duration) {
            Some((phase, text)) if !hook.report(phase, &text) => LineFlow::Abort,
            _ if hook.is_stopped() => LineFlow::Abort,
            _ => LineFlow::Continue,
        })
        .map_err(|e| TransferFailure::Failed(format!("{e:#}")))?;

        if outcome.success() {
            Ok(())
        } else if outcome.aborted || outcome.status.is_none() {
            Err(TransferFailure::Failed("conversion aborted".to_string()))
        } else {
            Err(TransferFailure::Failed(outcome.error_message()))
        }
    }

    fn force_abort(&self) {
        self.running.kill();
    }
}
