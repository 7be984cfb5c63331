//! Media metadata from `yt-dlp --dump-single-json`.

use anyhow::{Context, Result};
use serde::Deserialize;

/// Display metadata for a URL, as shown before a download starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: Option<String>,
    pub is_playlist: bool,
    /// Number of entries (1 for a single video).
    pub item_count: usize,
    /// `"best"` followed by the distinct available heights, highest first.
    pub qualities: Vec<String>,
}

/// Size and name of a playlist, from `yt-dlp --flat-playlist`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSummary {
    pub title: Option<String>,
    pub item_count: usize,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
    entries: Option<Vec<Option<RawInfo>>>,
    playlist_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    height: Option<u32>,
}

/// Build the quality list from the format heights.
pub fn qualities_from_heights<I>(heights: I) -> Vec<String>
where
    I: IntoIterator<Item = u32>,
{
    let mut heights: Vec<u32> = heights.into_iter().filter(|h| *h > 0).collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();
    std::iter::once("best".to_string())
        .chain(heights.into_iter().map(|h| format!("{h}p")))
        .collect()
}

/// Parse the JSON printed by `yt-dlp --dump-single-json`.
///
/// For playlists, title, thumbnail and formats come from the first entry;
/// the item count from `playlist_count`, falling back to the entries seen.
pub fn parse_media_info(json: &str) -> Result<MediaInfo> {
    let raw: RawInfo = serde_json::from_str(json).context("invalid yt-dlp JSON")?;
    let is_playlist = raw.kind.as_deref() == Some("playlist") || raw.entries.is_some();

    if !is_playlist {
        return Ok(MediaInfo {
            title: raw.title.unwrap_or_default(),
            thumbnail: raw.thumbnail,
            is_playlist: false,
            item_count: 1,
            qualities: qualities_from_heights(raw.formats.iter().filter_map(|f| f.height)),
        });
    }

    let entries: Vec<RawInfo> = raw.entries.unwrap_or_default().into_iter().flatten().collect();
    let item_count = raw.playlist_count.unwrap_or(entries.len());
    let first = entries.into_iter().next();
    let qualities = qualities_from_heights(
        first
            .as_ref()
            .map(|e| e.formats.iter().filter_map(|f| f.height).collect::<Vec<_>>())
            .unwrap_or_default(),
    );
    let (title, thumbnail) = match first {
        Some(e) => (e.title.or(raw.title), e.thumbnail.or(raw.thumbnail)),
        None => (raw.title, raw.thumbnail),
    };
    Ok(MediaInfo {
        title: title.unwrap_or_default(),
        thumbnail,
        is_playlist: true,
        item_count,
        qualities,
    })
}

/// Parse the JSON printed by `yt-dlp --flat-playlist --dump-single-json`.
///
/// The count is the number of listed entries; `playlist_count` is used only
/// when no entry list is present. A single video counts as one item.
pub fn parse_playlist_summary(json: &str) -> Result<PlaylistSummary> {
    let raw: RawInfo = serde_json::from_str(json).context("invalid yt-dlp JSON")?;
    let listed = raw
        .entries
        .as_ref()
        .map(|entries| entries.iter().filter(|e| e.is_some()).count());
    let item_count = match listed {
        Some(n) if n > 0 => n,
        _ => raw.playlist_count.filter(|n| *n > 0).unwrap_or(1),
    };
    Ok(PlaylistSummary {
        title: raw.title,
        item_count,
    })
}
