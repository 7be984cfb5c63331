//! `vdm get <url>...` – download videos or playlists through yt-dlp.

use anyhow::{bail, Context, Result};
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;
use vdm_core::config::VdmConfig;
use vdm_core::control::JobControl;
use vdm_core::job::{JobController, JobStatus, WorkDescriptor};
use vdm_core::ytdlp::{validate_url, YtDlp};

use crate::cli::control_socket;
use crate::cli::jobs::{self, RegisteredJob};
use crate::cli::progress::BarSink;

/// `get` flags merged with config defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOptions {
    pub dest: PathBuf,
    pub quality: String,
    pub extract_audio: bool,
    pub subtitle_langs: Vec<String>,
    pub playlist: bool,
}

impl GetOptions {
    pub fn resolve(
        cfg: &VdmConfig,
        output: Option<PathBuf>,
        quality: Option<String>,
        audio: bool,
        subs: Option<String>,
        playlist: bool,
    ) -> Result<Self> {
        let dest = match output {
            Some(dir) => dir,
            None if !cfg.default_save_path.trim().is_empty() => {
                PathBuf::from(cfg.default_save_path.trim())
            }
            None => std::env::current_dir().context("current dir")?,
        };
        let subtitle_langs = match subs {
            Some(langs) => langs
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            None => cfg.subtitle_lang_list(),
        };
        Ok(Self {
            dest,
            quality: quality.unwrap_or_else(|| cfg.default_quality.clone()),
            extract_audio: audio || cfg.extract_audio,
            subtitle_langs,
            playlist,
        })
    }

    fn work_for(&self, url: &str) -> WorkDescriptor {
        WorkDescriptor::new(url.trim(), &self.dest)
            .with_quality(&self.quality)
            .with_playlist(self.playlist)
            .with_extract_audio(self.extract_audio)
            .with_subtitles(self.subtitle_langs.iter().cloned())
    }
}

pub async fn run_get(cfg: &VdmConfig, urls: Vec<String>, opts: GetOptions) -> Result<()> {
    for url in &urls {
        validate_url(url)?;
    }
    std::fs::create_dir_all(&opts.dest)
        .with_context(|| format!("create output dir {}", opts.dest.display()))?;

    let job_control = Arc::new(JobControl::new());
    let socket = control_socket::socket_path().ok().and_then(|path| {
        match control_socket::spawn_control_listener(Arc::clone(&job_control), &path) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some((path, handle))
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        }
    });

    let settings = cfg.job_settings();
    let multi = MultiProgress::new();
    let mut registered = Vec::with_capacity(urls.len());
    for url in &urls {
        let sink = Arc::new(BarSink::new(&multi, "#?", url));
        let job = Arc::new(JobController::new(
            opts.work_for(url),
            Arc::new(YtDlp::new(&cfg.ytdlp_path)),
            sink.clone(),
            settings,
        ));
        let id = job_control.register(Arc::clone(&job));
        sink.set_prefix(format!("#{id}"));
        tracing::info!(id, %url, "queued download");
        registered.push(RegisteredJob { id, job, sink });
    }

    let outcomes = jobs::run_all(
        Arc::clone(&job_control),
        registered,
        cfg.effective_max_downloads(),
    )
    .await;

    if let Some((path, handle)) = socket {
        handle.abort();
        control_socket::remove_socket(&path);
    }

    let outcomes = outcomes?;
    let failed = jobs::report(&outcomes);
    let finished = outcomes
        .iter()
        .filter(|o| o.status == JobStatus::Finished)
        .count();
    println!("{finished} of {} download(s) finished", outcomes.len());
    if failed > 0 {
        bail!("{failed} of {} downloads failed", outcomes.len());
    }
    Ok(())
}
