//! CLI for the VDM video download manager.

mod commands;
mod control_socket;
mod jobs;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use vdm_core::config;
use vdm_core::control::ControlCommand;

use commands::{
    run_check_update, run_completions, run_config, run_control, run_convert, run_get, run_man,
    run_probe, GetOptions,
};

/// Top-level CLI for the VDM video download manager.
#[derive(Debug, Parser)]
#[command(name = "vdm", version)]
#[command(about = "VDM: video and playlist downloader built on yt-dlp", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show title, playlist size and available qualities for a URL.
    Probe {
        /// Video or playlist URL.
        url: String,
    },

    /// Download one or more videos or playlists.
    Get {
        /// Video or playlist URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Output directory (default: config `default_save_path`, else the current dir).
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Quality: "best", a height such as "720p", or a raw yt-dlp format selector.
        #[arg(short, long)]
        quality: Option<String>,

        /// Keep only the audio track, as mp3.
        #[arg(long)]
        audio: bool,

        /// Comma-separated subtitle languages to fetch after the download (e.g. "en,fr").
        #[arg(long, value_name = "LANGS")]
        subs: Option<String>,

        /// Download the whole playlist when the URL names one.
        #[arg(long, overrides_with = "no_playlist")]
        playlist: bool,

        /// Download only the single video even if the URL is part of a playlist.
        #[arg(long = "no-playlist")]
        no_playlist: bool,
    },

    /// Convert a local media file with ffmpeg.
    Convert {
        /// Input media file.
        input: PathBuf,

        /// Output file.
        output: PathBuf,

        /// Target format: mp4, avi, mkv or mp3 (default: from the output extension).
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Pause a running download by its ID (as shown by `vdm get`).
    Pause {
        /// Job identifier.
        id: u64,
    },

    /// Resume a paused download by its ID.
    Resume {
        /// Job identifier.
        id: u64,
    },

    /// Stop a running or paused download by its ID.
    Stop {
        /// Job identifier.
        id: u64,
    },

    /// Check the release feed for a newer version.
    CheckUpdate {
        /// Download the release asset to this path when an update is available.
        #[arg(long, value_name = "PATH")]
        download: Option<PathBuf>,
    },

    /// Show or change configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },

    /// Print the man page.
    Man,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print every key and its value.
    Show,
    /// Print the config file path.
    Path,
    /// Print one value.
    Get { key: String },
    /// Set one value and save.
    Set { key: String, value: String },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        // Commands that never touch the config file.
        match cli.command {
            CliCommand::Completions { shell } => run_completions(shell),
            CliCommand::Man => run_man(),
            CliCommand::Config { action } => run_config(action),
            CliCommand::Pause { id } => run_control(ControlCommand::Pause(id)).await,
            CliCommand::Resume { id } => run_control(ControlCommand::Resume(id)).await,
            CliCommand::Stop { id } => run_control(ControlCommand::Stop(id)).await,
            other => other.run_with_config().await,
        }
    }

    async fn run_with_config(self) -> Result<()> {
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match self {
            CliCommand::Probe { url } => run_probe(&cfg, &url).await?,
            CliCommand::Get {
                urls,
                output,
                quality,
                audio,
                subs,
                playlist,
                no_playlist: _,
            } => {
                let opts = GetOptions::resolve(&cfg, output, quality, audio, subs, playlist)?;
                run_get(&cfg, urls, opts).await?;
            }
            CliCommand::Convert {
                input,
                output,
                format,
            } => run_convert(&cfg, input, output, format).await?,
            CliCommand::CheckUpdate { download } => run_check_update(&cfg, download).await?,
            CliCommand::Completions { .. }
            | CliCommand::Man
            | CliCommand::Config { .. }
            | CliCommand::Pause { .. }
            | CliCommand::Resume { .. }
            | CliCommand::Stop { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
