//! `vdm probe <url>` – show what a URL would download.

use anyhow::{Context, Result};
use vdm_core::config::VdmConfig;
use vdm_core::ytdlp::YtDlp;

pub async fn run_probe(cfg: &VdmConfig, url: &str) -> Result<()> {
    let ytdlp = YtDlp::new(&cfg.ytdlp_path);
    let url = url.to_string();
    let info = tokio::task::spawn_blocking(move || ytdlp.probe(&url))
        .await
        .context("probe task join")??;

    println!("Title:     {}", info.title);
    if info.is_playlist {
        println!("Playlist:  {} item(s)", info.item_count);
    }
    if let Some(thumb) = &info.thumbnail {
        println!("Thumbnail: {thumb}");
    }
    println!("Qualities: {}", info.qualities.join(", "));
    Ok(())
}
