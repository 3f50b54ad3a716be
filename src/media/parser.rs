//! Parsers for yt-dlp output and platform responses

use crate::error::{Error, Result};
use crate::types::{CollectionItem, MediaInfo};
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Prefix of the line yt-dlp prints with the final file path
pub(crate) const FILEPATH_MARKER: &str = "FILEPATH:";

#[allow(clippy::expect_used)] // static pattern
fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid regex"))
}

#[allow(clippy::expect_used)] // static pattern
fn page_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""page":(\d+),"#).expect("valid regex"))
}

/// Part-local percentage from a `[download]  42.0% of ...` line
pub fn parse_progress_line(line: &str) -> Option<f32> {
    let caps = progress_regex().captures(line.trim_start())?;
    caps.get(1)?.as_str().parse::<f32>().ok()
}

/// Final artifact path from a `FILEPATH:/out/title.mp3` line
pub fn parse_filepath_line(line: &str) -> Option<PathBuf> {
    let path = line.trim().strip_prefix(FILEPATH_MARKER)?.trim();
    if path.is_empty() || path == "NA" {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Highest `"page":N,` index embedded in a video page, if any
pub fn max_page_index(html: &str) -> Option<u32> {
    page_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .max()
}

#[derive(Deserialize)]
struct DumpedThumbnail {
    url: String,
}

#[derive(Deserialize)]
struct DumpedInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<DumpedThumbnail>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
}

/// Metadata from `yt-dlp --dump-single-json` output
///
/// When no `thumbnail` is present the last (highest quality) entry of `thumbnails`
/// is used.
pub fn parse_metadata_json(bytes: &[u8]) -> Result<MediaInfo> {
    let info: DumpedInfo = serde_json::from_slice(bytes)?;
    let thumbnail = info
        .thumbnail
        .filter(|t| !t.is_empty())
        .or_else(|| info.thumbnails.last().map(|t| t.url.clone()));

    Ok(MediaInfo {
        title: info.title.unwrap_or_default(),
        thumbnail,
        duration: info.duration,
        uploader: info.uploader,
        upload_date: info.upload_date,
    })
}

#[derive(Deserialize)]
struct ArchivesResponse {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<ArchivesData>,
}

#[derive(Deserialize)]
struct ArchivesData {
    #[serde(default)]
    archives: Vec<Archive>,
    page: Option<ArchivesPage>,
}

#[derive(Deserialize)]
struct Archive {
    bvid: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct ArchivesPage {
    #[serde(default)]
    total: u32,
}

/// One page of a collection listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPage {
    /// Members on this page
    pub items: Vec<CollectionItem>,
    /// Total members in the collection, as reported by the platform
    pub total: u32,
}

/// Parse one page of the seasons-archives listing API
pub fn parse_collection_page(bytes: &[u8]) -> Result<CollectionPage> {
    let response: ArchivesResponse = serde_json::from_slice(bytes)?;
    if response.code != 0 {
        return Err(Error::ExternalTool(format!(
            "collection listing returned code {}: {}",
            response.code, response.message
        )));
    }

    let data = response
        .data
        .ok_or_else(|| Error::ExternalTool("collection listing has no data".to_string()))?;
    let items: Vec<CollectionItem> = data
        .archives
        .into_iter()
        .map(|a| CollectionItem {
            video_id: a.bvid,
            title: a.title,
        })
        .collect();
    let total = data
        .page
        .map(|p| p.total)
        .unwrap_or(u32::try_from(items.len()).unwrap_or(u32::MAX));

    Ok(CollectionPage { items, total })
}
