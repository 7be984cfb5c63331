//! `vdm check-update` – compare against the latest published release.

use anyhow::{bail, Context, Result};
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;
use vdm_core::config::VdmConfig;
use vdm_core::control::JobControl;
use vdm_core::job::{JobController, JobStatus, WorkDescriptor};
use vdm_core::update::{ReleaseDownload, UpdateChecker, UpdateStatus};

use crate::cli::jobs::{self, RegisteredJob};
use crate::cli::progress::BarSink;

pub async fn run_check_update(cfg: &VdmConfig, download: Option<PathBuf>) -> Result<()> {
    let checker = UpdateChecker::new(&cfg.update_feed_url, env!("CARGO_PKG_VERSION"))?;
    let current = checker.current().clone();
    let status = tokio::task::spawn_blocking(move || checker.check())
        .await
        .context("update check task join")??;

    let (version, url) = match status {
        UpdateStatus::UpToDate { latest } => {
            println!("vdm {current} is up to date (latest release: {latest})");
            return Ok(());
        }
        UpdateStatus::Available {
            version,
            download_url,
        } => (version, download_url),
    };
    println!("vdm {version} is available (running {current})");
    if let Some(url) = &url {
        println!("Download: {url}");
    }

    let Some(dest) = download else {
        return Ok(());
    };
    let Some(url) = url else {
        bail!("release {version} has no download URL");
    };

    let multi = MultiProgress::new();
    let sink = Arc::new(BarSink::new(&multi, "update", &format!("vdm {version}")));
    let job = Arc::new(JobController::new(
        WorkDescriptor::new(url, &dest),
        Arc::new(ReleaseDownload),
        sink.clone(),
        cfg.job_settings(),
    ));
    let control = Arc::new(JobControl::new());
    let id = control.register(Arc::clone(&job));
    let outcomes = jobs::run_all(control, vec![RegisteredJob { id, job, sink }], 1).await?;
    match outcomes.first() {
        Some(o) if o.status == JobStatus::Finished => {
            println!("Saved {}", dest.display());
            Ok(())
        }
        Some(o) => bail!(
            "release download {}: {}",
            o.status,
            o.failure.as_deref().unwrap_or("no details")
        ),
        None => bail!("release download did not run"),
    }
}
