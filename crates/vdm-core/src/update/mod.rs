//! Update checker: compare the running version against the latest release
//! published on a release feed, and download the release asset.
//!
//! Uses the curl crate (libcurl). The feed is a GitHub-style "latest
//! release" JSON document (`tag_name`, `html_url`, `assets[]`).

mod version;

pub use version::Version;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::cell::Cell;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::job::{
    Enumeration, EnumerationError, ProgressHook, ProgressPhase, TransferFailure, WorkDescriptor,
    WorkOperation,
};

const USER_AGENT: &str = concat!("vdm/", env!("CARGO_PKG_VERSION"));

/// Latest published release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub version: Version,
    /// First asset's download URL, else the release page.
    pub download_url: Option<String>,
}

/// Outcome of an update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { latest: Version },
    Available { version: Version, download_url: Option<String> },
}

#[derive(Debug, Deserialize)]
struct RawRelease {
    tag_name: String,
    html_url: Option<String>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    browser_download_url: String,
}

/// Parse a "latest release" document.
pub fn parse_release(json: &[u8]) -> Result<Release> {
    let raw: RawRelease = serde_json::from_slice(json).context("invalid release JSON")?;
    let version = Version::parse(&raw.tag_name)?;
    let download_url = raw
        .assets
        .into_iter()
        .next()
        .map(|a| a.browser_download_url)
        .or(raw.html_url);
    Ok(Release {
        tag: raw.tag_name,
        version,
        download_url,
    })
}

/// Compare a release against the running version.
pub fn evaluate(current: &Version, release: &Release) -> UpdateStatus {
    if release.version > *current {
        UpdateStatus::Available {
            version: release.version.clone(),
            download_url: release.download_url.clone(),
        }
    } else {
        UpdateStatus::UpToDate {
            latest: release.version.clone(),
        }
    }
}

fn new_easy(url: &str) -> Result<curl::easy::Easy> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.useragent(USER_AGENT)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    Ok(easy)
}

/// GET a small document into memory.
fn http_get(url: &str) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    let mut easy = new_easy(url)?;
    easy.timeout(Duration::from_secs(30))?;
    let mut list = curl::easy::List::new();
    list.append("Accept: application/json")?;
    easy.http_headers(list)?;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform().context("GET request failed")?;
    }
    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        bail!("GET {} returned HTTP {}", url, code);
    }
    Ok(body)
}

/// Checks a release feed for a version newer than the running one.
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    feed_url: String,
    current: Version,
}

impl UpdateChecker {
    pub fn new(feed_url: impl Into<String>, current_version: &str) -> Result<Self> {
        Ok(Self {
            feed_url: feed_url.into(),
            current: Version::parse(current_version)?,
        })
    }

    pub fn current(&self) -> &Version {
        &self.current
    }

    /// Fetch the feed and compare. Blocking.
    pub fn check(&self) -> Result<UpdateStatus> {
        let body = http_get(&self.feed_url)
            .with_context(|| format!("fetch release feed {}", self.feed_url))?;
        let release = parse_release(&body)?;
        let status = evaluate(&self.current, &release);
        tracing::info!(current = %self.current, latest = %release.version, "update check");
        Ok(status)
    }
}

/// Downloads a release asset to a file, as a job operation. The descriptor's
/// `source` is the asset URL and `destination` the output file.
#[derive(Debug, Default)]
pub struct ReleaseDownload;

impl WorkOperation for ReleaseDownload {
    fn enumerate(&self, work: &WorkDescriptor) -> Result<Enumeration, EnumerationError> {
        url::Url::parse(&work.source)
            .map_err(|e| EnumerationError::new(format!("invalid URL {}: {e}", work.source)))?;
        Ok(Enumeration {
            item_count: 1,
            title: work
                .destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned()),
        })
    }

    fn transfer(&self, work: &WorkDescriptor, hook: &ProgressHook) -> Result<(), TransferFailure> {
        download_to_file(&work.source, &work.destination, hook)
    }
}

/// Status code of an HTTP status line (`HTTP/1.1 429 Too Many Requests`).
fn status_line_code(header: &[u8]) -> Option<u32> {
    let line = std::str::from_utf8(header).ok()?;
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse().ok()
}

fn download_to_file(url: &str, dest: &Path, hook: &ProgressHook) -> Result<(), TransferFailure> {
    let failed = |e: anyhow::Error| TransferFailure::Failed(format!("{e:#}"));
    let mut file = File::create(dest)
        .with_context(|| format!("create {}", dest.display()))
        .map_err(failed)?;
    let mut easy = new_easy(url).map_err(failed)?;
    easy.progress(true).map_err(|e| failed(e.into()))?;

    let curl_failed = |e: curl::Error| TransferFailure::Failed(e.to_string());
    // Status of the response being received; 0 until its status line arrives.
    // Redirect hops and error bodies must neither land in the file nor move progress.
    let status = Cell::new(0u32);
    let body_wanted = || (200..300).contains(&status.get());
    let mut write_error: Option<std::io::Error> = None;
    let performed;
    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|header| {
                if let Some(code) = status_line_code(header) {
                    status.set(code);
                }
                true
            })
            .map_err(curl_failed)?;
        transfer
            .write_function(|data| {
                if !body_wanted() {
                    return Ok(data.len());
                }
                match file.write_all(data) {
                    Ok(()) => Ok(data.len()),
                    Err(e) => {
                        write_error = Some(e);
                        Ok(0) // abort transfer
                    }
                }
            })
            .map_err(curl_failed)?;
        transfer
            .progress_function(|dltotal, dlnow, _, _| {
                if dltotal <= 0.0 || !body_wanted() {
                    return !hook.is_stopped();
                }
                let pct = (dlnow / dltotal * 100.0).clamp(0.0, 100.0);
                hook.report(ProgressPhase::Progressing, &format!("{pct:.1}"))
            })
            .map_err(curl_failed)?;
        performed = transfer.perform();
    }

    if let Some(e) = write_error {
        return Err(TransferFailure::Failed(format!("write {}: {e}", dest.display())));
    }
    if hook.is_stopped() {
        return Err(TransferFailure::Failed("download aborted".to_string()));
    }
    performed.map_err(|e| TransferFailure::from_message(e.to_string()))?;

    let code = easy.response_code().map_err(curl_failed)?;
    if code == 429 {
        return Err(TransferFailure::RateLimited(format!("GET {url} returned HTTP 429")));
    }
    if !(200..300).contains(&code) {
        return Err(TransferFailure::Failed(format!("GET {url} returned HTTP {code}")));
    }
    hook.report(ProgressPhase::ItemComplete, "");
    Ok(())
}
