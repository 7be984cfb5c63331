//! `vdm convert <input> <output>` – transcode a local file with ffmpeg.

use anyhow::{bail, Context, Result};
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;
use vdm_core::config::VdmConfig;
use vdm_core::control::JobControl;
use vdm_core::convert::{Converter, TargetFormat};
use vdm_core::job::{JobController, JobStatus, WorkDescriptor};

use crate::cli::jobs::{self, RegisteredJob};
use crate::cli::progress::BarSink;

pub async fn run_convert(
    cfg: &VdmConfig,
    input: PathBuf,
    output: PathBuf,
    format: Option<String>,
) -> Result<()> {
    let format: TargetFormat = match format {
        Some(f) => f.parse()?,
        None => TargetFormat::from_path(&output).with_context(|| {
            format!(
                "cannot tell the format of {}; pass --format",
                output.display()
            )
        })?,
    };

    let work = WorkDescriptor::new(input.to_string_lossy(), &output).with_quality(format.extension());
    let multi = MultiProgress::new();
    let sink = Arc::new(BarSink::new(&multi, "convert", &output.display().to_string()));
    let job = Arc::new(JobController::new(
        work,
        Arc::new(Converter::new(&cfg.ffmpeg_path, &cfg.ffprobe_path)),
        sink.clone(),
        cfg.job_settings(),
    ));
    let control = Arc::new(JobControl::new());
    let id = control.register(Arc::clone(&job));

    let outcomes = jobs::run_all(control, vec![RegisteredJob { id, job, sink }], 1).await?;
    match outcomes.first().map(|o| (o.status, o.failure.clone())) {
        Some((JobStatus::Finished, _)) => {
            println!("Converted {} -> {}", input.display(), output.display());
            Ok(())
        }
        Some((JobStatus::Failed, failure)) => {
            bail!("conversion failed: {}", failure.unwrap_or_default())
        }
        Some((status, _)) => bail!("conversion {status}"),
        None => bail!("conversion did not run"),
    }
}
