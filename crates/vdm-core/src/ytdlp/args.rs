//! Command-line arguments for yt-dlp and parsing of its progress lines.

use crate::job::{ProgressPhase, WorkDescriptor};

/// Prefix of progress lines produced by our progress template.
pub const PROGRESS_PREFIX: &str = "vdm-progress:";
/// Prefix of the line printed once per finished item.
pub const DONE_PREFIX: &str = "vdm-done:";

const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Map a user-facing quality ("best", "720p") to a yt-dlp format selector.
/// Unknown values pass through untouched.
pub fn quality_selector(quality: &str, extract_audio: bool) -> String {
    if extract_audio {
        return "bestaudio/best".to_string();
    }
    let q = quality.trim();
    if q.is_empty() || q.eq_ignore_ascii_case("best") {
        return "bestvideo*+bestaudio/best".to_string();
    }
    if let Some(height) = q.strip_suffix('p').and_then(|h| h.parse::<u32>().ok()) {
        return format!("bestvideo*[height<={height}]+bestaudio/best[height<={height}]");
    }
    q.to_string()
}

fn playlist_flag(work: &WorkDescriptor) -> &'static str {
    if work.playlist {
        "--yes-playlist"
    } else {
        "--no-playlist"
    }
}

fn output_args(work: &WorkDescriptor) -> Vec<String> {
    vec![
        "-P".to_string(),
        work.destination.to_string_lossy().into_owned(),
        "-o".to_string(),
        OUTPUT_TEMPLATE.to_string(),
    ]
}

/// Arguments for probing metadata (first playlist entry only).
pub fn probe_args(url: &str) -> Vec<String> {
    [
        "--dump-single-json",
        "--no-warnings",
        "--playlist-items",
        "1",
        "--",
        url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Arguments for counting a playlist's entries without resolving each one.
pub fn flat_playlist_args(url: &str) -> Vec<String> {
    [
        "--flat-playlist",
        "--dump-single-json",
        "--no-warnings",
        "--yes-playlist",
        "--",
        url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Arguments for the main transfer.
pub fn transfer_args(work: &WorkDescriptor) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--newline".into(),
        "--progress".into(),
        "--no-simulate".into(),
        "--continue".into(),
        "--progress-template".into(),
        format!("download:{PROGRESS_PREFIX}%(progress._percent_str)s"),
        "--print".into(),
        format!("after_move:{DONE_PREFIX}%(filepath)s"),
        "-f".into(),
        quality_selector(&work.quality, work.extract_audio),
        playlist_flag(work).into(),
    ];
    if work.extract_audio {
        args.extend(
            ["-x", "--audio-format", "mp3", "--audio-quality", "192K"]
                .iter()
                .map(|s| s.to_string()),
        );
    }
    args.extend(output_args(work));
    args.push("--".into());
    args.push(work.source.clone());
    args
}

/// Arguments for fetching subtitles only.
pub fn subtitle_args(work: &WorkDescriptor) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--skip-download".into(),
        "--write-subs".into(),
        "--sub-langs".into(),
        work.subtitle_langs.join(","),
        "--sub-format".into(),
        "vtt".into(),
        "--no-warnings".into(),
        playlist_flag(work).into(),
    ];
    args.extend(output_args(work));
    args.push("--".into());
    args.push(work.source.clone());
    args
}

/// Recognise one of our progress lines. Other output is `None`.
pub fn parse_progress_line(line: &str) -> Option<(ProgressPhase, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        return Some((ProgressPhase::Progressing, rest));
    }
    if let Some(rest) = line.strip_prefix(DONE_PREFIX) {
        return Some((ProgressPhase::ItemComplete, rest));
    }
    None
}
