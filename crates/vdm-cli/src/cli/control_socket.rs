//! Control socket: server (during `vdm get`) and client (`vdm pause|resume|stop`).
//! Protocol: one line per command: "pause <id>", "resume <id>" or "stop <id>".

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use vdm_core::control::{ControlCommand, JobControl};

/// Spawns a task that listens on `path` and applies each command line to
/// `job_control`. Malformed lines and unknown ids are logged and ignored.
pub fn spawn_control_listener(
    job_control: Arc<JobControl>,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create control socket dir {}", dir.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let control = Arc::clone(&job_control);
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(stream).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let Some(command) = ControlCommand::parse_line(&line) else {
                                tracing::debug!(line = %line.trim(), "ignoring control line");
                                continue;
                            };
                            let control = Arc::clone(&control);
                            // Stop blocks for up to the grace period.
                            let applied =
                                tokio::task::spawn_blocking(move || control.apply(command)).await;
                            match applied {
                                Ok(Some(status)) => {
                                    tracing::info!(?command, %status, "control command applied")
                                }
                                Ok(None) => tracing::warn!(?command, "control command for unknown job"),
                                Err(e) => tracing::warn!("control command task: {}", e),
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Removes the socket file once the listener is done with it.
pub fn remove_socket(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!(path = %path.display(), "remove control socket: {}", e);
    }
}

/// Sends one command line to the control socket of a running `vdm get`.
pub async fn send_command(socket_path: &Path, command: ControlCommand) -> Result<()> {
    if !socket_path.exists() {
        anyhow::bail!(
            "no running `vdm get` found (control socket {} does not exist)",
            socket_path.display()
        );
    }
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to control socket {}", socket_path.display()))?;
    stream.write_all(command.to_line().as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

/// The control socket path, as an error-friendly `anyhow::Result`.
pub fn socket_path() -> Result<PathBuf> {
    vdm_core::control::default_control_socket_path().context("locate control socket")
}
