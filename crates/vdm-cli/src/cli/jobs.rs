//! Running registered jobs to completion from the async CLI: bounded
//! parallelism, Ctrl-C handling and a per-job outcome.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use vdm_core::control::JobControl;
use vdm_core::job::{JobController, JobStatus};

use crate::cli::progress::BarSink;

/// A job registered with the control registry, with the sink that shows it.
pub struct RegisteredJob {
    pub id: u64,
    pub job: Arc<JobController>,
    pub sink: Arc<BarSink>,
}

/// Final state of one job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub id: u64,
    pub source: String,
    pub status: JobStatus,
    pub failure: Option<String>,
}

/// Start every job with at most `max_parallel` running at once and wait for
/// all of them. Ctrl-C stops every job, including those not started yet.
pub async fn run_all(
    control: Arc<JobControl>,
    jobs: Vec<RegisteredJob>,
    max_parallel: usize,
) -> Result<Vec<JobOutcome>> {
    let interrupt = {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping downloads...");
                tracing::info!("ctrl-c received; stopping all jobs");
                let _ = tokio::task::spawn_blocking(move || control.stop_all()).await;
            }
        })
    };

    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(jobs.len());
    for entry in jobs {
        let permits = Arc::clone(&permits);
        handles.push(tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.context("job semaphore closed")?;
            let job = Arc::clone(&entry.job);
            let snapshot = tokio::task::spawn_blocking(move || {
                job.start()?;
                Ok::<_, anyhow::Error>(job.wait(None))
            })
            .await
            .context("job task join")??;
            if snapshot.status == JobStatus::Stopped {
                entry.sink.abandon("stopped");
            }
            Ok::<_, anyhow::Error>(JobOutcome {
                id: entry.id,
                source: entry.job.work().source.clone(),
                status: snapshot.status,
                failure: entry.sink.failure(),
            })
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        let outcome = handle.await.context("job task join")??;
        control.unregister(outcome.id);
        outcomes.push(outcome);
    }
    interrupt.abort();
    Ok(outcomes)
}

/// Print a summary line per unsuccessful job. Returns the number of failures.
pub fn report(outcomes: &[JobOutcome]) -> usize {
    let mut failed = 0;
    for o in outcomes {
        match o.status {
            JobStatus::Finished => {}
            JobStatus::Failed => {
                failed += 1;
                println!(
                    "#{} failed: {} ({})",
                    o.id,
                    o.failure.as_deref().unwrap_or("unknown error"),
                    o.source
                );
            }
            other => println!("#{} {}: {}", o.id, other, o.source),
        }
    }
    failed
}
