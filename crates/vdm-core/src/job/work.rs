//! The contract between the controller and the external operation it drives.

use std::path::PathBuf;

use super::controller::ProgressHook;
use super::error::{EnumerationError, TransferFailure};

/// What a job should fetch or transform, and where to put it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDescriptor {
    /// URL or input path, interpreted by the operation.
    pub source: String,
    /// Output directory (downloads) or output file (conversions).
    pub destination: PathBuf,
    /// Quality/format selector. Opaque to the controller.
    pub quality: String,
    /// Whether the source spans multiple sub-items.
    pub playlist: bool,
    /// Keep only the audio track.
    pub extract_audio: bool,
    /// Subtitle languages fetched after a successful transfer (empty = none).
    pub subtitle_langs: Vec<String>,
}

impl WorkDescriptor {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            quality: "best".to_string(),
            playlist: false,
            extract_audio: false,
            subtitle_langs: Vec::new(),
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn with_playlist(mut self, playlist: bool) -> Self {
        self.playlist = playlist;
        self
    }

    pub fn with_extract_audio(mut self, extract_audio: bool) -> Self {
        self.extract_audio = extract_audio;
        self
    }

    pub fn with_subtitles<I, S>(mut self, langs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subtitle_langs = langs.into_iter().map(Into::into).collect();
        self
    }
}

/// Result of enumerating a job's work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    /// Number of sub-items; the controller treats 0 as 1.
    pub item_count: usize,
    /// Display title, when the operation knows one.
    pub title: Option<String>,
}

impl Enumeration {
    pub fn single() -> Self {
        Self {
            item_count: 1,
            title: None,
        }
    }
}

/// An external "fetch/transform one unit of work" capability.
///
/// Implementations run on the job's worker thread. They report progress
/// through the hook and should stop early once [`ProgressHook::report`]
/// returns `false` or [`ProgressHook::is_stopped`] is true.
pub trait WorkOperation: Send + Sync {
    /// Determine how many sub-items the work spans. Called once per job.
    fn enumerate(&self, work: &WorkDescriptor) -> Result<Enumeration, EnumerationError>;

    /// Perform the whole transfer. Called again after a rate-limit wait.
    fn transfer(&self, work: &WorkDescriptor, hook: &ProgressHook) -> Result<(), TransferFailure>;

    /// Optional secondary step after a successful transfer. Failures are not fatal.
    fn fetch_subtitles(&self, _work: &WorkDescriptor) -> Result<(), TransferFailure> {
        Ok(())
    }

    /// Tear down whatever `transfer` is running right now. Called from the
    /// caller's thread when a stopped job does not exit within the grace period.
    fn force_abort(&self) {}
}
