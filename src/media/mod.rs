//! External media capabilities
//!
//! The downloader never talks to the platform or touches audio containers directly.
//! It goes through two traits:
//!
//! - [`MediaSource`]: part discovery, collection listing, metadata and transfer
//! - [`TagWriter`]: writing tags and cover art into a finished file
//!
//! Default implementations drive external binaries:
//!
//! - [`YtDlpSource`]: `yt-dlp` for metadata and transfer, HTTP for discovery
//! - [`FfmpegTagWriter`]: `ffmpeg` remux with ID3v2.3 tags
//! - [`NoOpTagWriter`]: stand-in when `ffmpeg` is unavailable
//!
//! [`MetadataEmbedder`] wraps a [`TagWriter`] with the wait-for-artifact step.

mod embedder;
mod ffmpeg;
mod noop;
pub mod parser;
mod traits;
mod ytdlp;

pub use embedder::MetadataEmbedder;
pub use ffmpeg::FfmpegTagWriter;
pub use noop::NoOpTagWriter;
pub use traits::{
    AcquireRequest, AcquiredArtifact, AudioTags, MediaSource, ResumePoint, TagWriter,
};
pub use ytdlp::YtDlpSource;
