use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::job::{JobSettings, RateLimitBackoff};

/// Upper bound for `max_downloads`.
pub const MAX_DOWNLOADS_LIMIT: usize = 10;

/// Default release feed for `vdm check-update`.
pub const DEFAULT_UPDATE_FEED: &str = "https://api.github.com/repos/vdm-dev/vdm/releases/latest";

/// Flat key-value configuration loaded from `~/.config/vdm/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VdmConfig {
    /// Directory downloads land in when `-o` is not given (empty = current dir).
    pub default_save_path: String,
    /// Quality used when `-q` is not given ("best", "720p", ...).
    pub default_quality: String,
    /// Maximum number of jobs `vdm get` runs at once (1-10).
    pub max_downloads: usize,
    /// Extract audio (mp3) by default.
    pub extract_audio: bool,
    /// Comma-separated subtitle languages fetched after each download (empty = none).
    pub subtitle_langs: String,
    /// Seconds to wait after "too many requests" before retrying.
    pub rate_limit_wait_secs: u64,
    /// Pause/backoff polling increment in milliseconds.
    pub poll_interval_ms: u64,
    /// Seconds `stop` waits for a job to wind down before forcing it.
    pub stop_grace_secs: u64,
    pub ytdlp_path: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Release feed queried by the update checker.
    pub update_feed_url: String,
}

impl Default for VdmConfig {
    fn default() -> Self {
        Self {
            default_save_path: String::new(),
            default_quality: "best".to_string(),
            max_downloads: 1,
            extract_audio: false,
            subtitle_langs: String::new(),
            rate_limit_wait_secs: 60,
            poll_interval_ms: 1000,
            stop_grace_secs: 5,
            ytdlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            update_feed_url: DEFAULT_UPDATE_FEED.to_string(),
        }
    }
}

/// Keys accepted by [`VdmConfig::get`] and [`VdmConfig::set`].
pub const CONFIG_KEYS: &[&str] = &[
    "default_save_path",
    "default_quality",
    "max_downloads",
    "extract_audio",
    "subtitle_langs",
    "rate_limit_wait_secs",
    "poll_interval_ms",
    "stop_grace_secs",
    "ytdlp_path",
    "ffmpeg_path",
    "ffprobe_path",
    "update_feed_url",
];

impl VdmConfig {
    /// Job timing derived from this config.
    pub fn job_settings(&self) -> JobSettings {
        let tick = Duration::from_millis(self.poll_interval_ms.max(1));
        JobSettings {
            backoff: RateLimitBackoff {
                window: Duration::from_secs(self.rate_limit_wait_secs),
                tick,
            },
            poll_interval: tick,
            stop_grace: Duration::from_secs(self.stop_grace_secs),
        }
    }

    /// `max_downloads` clamped to 1..=10.
    pub fn effective_max_downloads(&self) -> usize {
        self.max_downloads.clamp(1, MAX_DOWNLOADS_LIMIT)
    }

    /// Subtitle languages as a list.
    pub fn subtitle_lang_list(&self) -> Vec<String> {
        split_langs(&self.subtitle_langs)
    }

    /// Value of one key, formatted as it would be written by `set`.
    pub fn get(&self, key: &str) -> Result<String> {
        Ok(match key {
            "default_save_path" => self.default_save_path.clone(),
            "default_quality" => self.default_quality.clone(),
            "max_downloads" => self.max_downloads.to_string(),
            "extract_audio" => self.extract_audio.to_string(),
            "subtitle_langs" => self.subtitle_langs.clone(),
            "rate_limit_wait_secs" => self.rate_limit_wait_secs.to_string(),
            "poll_interval_ms" => self.poll_interval_ms.to_string(),
            "stop_grace_secs" => self.stop_grace_secs.to_string(),
            "ytdlp_path" => self.ytdlp_path.clone(),
            "ffmpeg_path" => self.ffmpeg_path.clone(),
            "ffprobe_path" => self.ffprobe_path.clone(),
            "update_feed_url" => self.update_feed_url.clone(),
            other => bail!("unknown config key {other:?}"),
        })
    }

    /// Set one key from its string form, validating the value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "default_save_path" => self.default_save_path = value.to_string(),
            "default_quality" => {
                if value.trim().is_empty() {
                    bail!("default_quality must not be empty");
                }
                self.default_quality = value.trim().to_string();
            }
            "max_downloads" => {
                let n: usize = value.parse().context("max_downloads must be an integer")?;
                if !(1..=MAX_DOWNLOADS_LIMIT).contains(&n) {
                    bail!("max_downloads must be between 1 and {MAX_DOWNLOADS_LIMIT}");
                }
                self.max_downloads = n;
            }
            "extract_audio" => {
                self.extract_audio = value.parse().context("extract_audio must be true or false")?;
            }
            "subtitle_langs" => self.subtitle_langs = split_langs(value).join(","),
            "rate_limit_wait_secs" => {
                self.rate_limit_wait_secs = value.parse().context("rate_limit_wait_secs must be an integer")?;
            }
            "poll_interval_ms" => {
                let ms: u64 = value.parse().context("poll_interval_ms must be an integer")?;
                if ms == 0 {
                    bail!("poll_interval_ms must be positive");
                }
                self.poll_interval_ms = ms;
            }
            "stop_grace_secs" => {
                self.stop_grace_secs = value.parse().context("stop_grace_secs must be an integer")?;
            }
            "ytdlp_path" => self.ytdlp_path = non_empty(key, value)?,
            "ffmpeg_path" => self.ffmpeg_path = non_empty(key, value)?,
            "ffprobe_path" => self.ffprobe_path = non_empty(key, value)?,
            "update_feed_url" => {
                url::Url::parse(value).context("update_feed_url must be a URL")?;
                self.update_feed_url = value.to_string();
            }
            other => bail!("unknown config key {other:?}"),
        }
        Ok(())
    }
}

fn non_empty(key: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        bail!("{key} must not be empty");
    }
    Ok(value.to_string())
}

fn split_langs(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VdmConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<VdmConfig> {
    if !path.exists() {
        let default_cfg = VdmConfig::default();
        save_at(path, &default_cfg)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: VdmConfig = toml::from_str(&data)
        .with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

pub fn save(cfg: &VdmConfig) -> Result<()> {
    save_at(&config_path()?, cfg)
}

pub fn save_at(path: &Path, cfg: &VdmConfig) -> Result<()> {
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml).with_context(|| format!("write config {}", path.display()))?;
    Ok(())
}
