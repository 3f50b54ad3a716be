//! Traits and types for the external media capabilities

use crate::error::Result;
use crate::types::{CollectionItem, MediaInfo, PartLocator};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Bytes already on disk for a part, to be continued rather than re-fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    /// The truncated artifact
    pub path: PathBuf,
    /// Number of bytes already present
    pub offset: u64,
    /// Size the finished artifact had when it was recorded
    pub expected: u64,
}

/// One acquisition call: transfer a part and transcode it to audio
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    /// Which part to fetch
    pub locator: PartLocator,
    /// Raw title of the part (used for the output file name)
    pub title: String,
    /// Directory the artifact is written into
    pub output_dir: PathBuf,
    /// Continue from an existing partial artifact
    pub resume_from: Option<ResumePoint>,
}

/// Result of a successful acquisition
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredArtifact {
    /// The finished audio file
    pub path: PathBuf,
    /// Bytes written by this call (excludes resumed bytes)
    pub bytes_transferred: u64,
}

/// Tag fields written into a finished artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioTags {
    /// Track title
    pub title: String,
    /// Artist (uploader)
    pub artist: Option<String>,
    /// Album (task title or output directory name)
    pub album: Option<String>,
    /// Recording date (`YYYYMMDD`)
    pub date: Option<String>,
}

/// Remote platform access: discovery, metadata and transfer
///
/// Implementations must be cheap to share between tasks; the downloader holds one
/// instance behind an `Arc` for every executor.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Number of parts of a video (1 for single-part videos)
    async fn count_parts(&self, video_id: &str) -> Result<u32>;

    /// Members of a collection, in listing order
    async fn list_collection(&self, owner_id: &str, season_id: &str)
    -> Result<Vec<CollectionItem>>;

    /// Metadata of one part
    async fn fetch_metadata(&self, locator: &PartLocator) -> Result<MediaInfo>;

    /// Transfer and transcode one part
    ///
    /// Part-local progress (0 to 100) is sent on `progress`; the receiver may lag, so
    /// implementations should `send().await` and stop reporting if the channel closes.
    /// When `request.resume_from` is set, only the missing bytes may be transferred.
    async fn acquire(
        &self,
        request: &AcquireRequest,
        progress: mpsc::Sender<f32>,
    ) -> Result<AcquiredArtifact>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}

/// Writes tags and cover art into an audio container
#[async_trait]
pub trait TagWriter: Send + Sync {
    /// Write `tags` (and `cover`, replacing any existing picture) into `path`
    async fn write_tags(&self, path: &Path, tags: &AudioTags, cover: Option<&[u8]>)
    -> Result<()>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}
