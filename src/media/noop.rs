//! No-op tag writer for graceful degradation

use super::traits::{AudioTags, TagWriter};
use async_trait::async_trait;
use std::path::Path;

/// Tag writer used when no `ffmpeg` binary is available
///
/// Every call returns [`Error::NotSupported`](crate::Error::NotSupported); the embedder
/// logs it and the artifact is kept untagged.
///
/// # Examples
///
/// ```
/// use bili_audio_dl::media::{AudioTags, NoOpTagWriter, TagWriter};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() {
/// let writer = NoOpTagWriter;
/// let result = writer
///     .write_tags(Path::new("a.mp3"), &AudioTags::default(), None)
///     .await;
/// assert!(result.is_err());
/// # }
/// ```
pub struct NoOpTagWriter;

#[async_trait]
impl TagWriter for NoOpTagWriter {
    async fn write_tags(
        &self,
        _path: &Path,
        _tags: &AudioTags,
        _cover: Option<&[u8]>,
    ) -> crate::Result<()> {
        Err(crate::Error::NotSupported(
            "Tag embedding requires an external ffmpeg binary. \
             Configure ffmpeg_path in config or ensure ffmpeg is in PATH."
                .into(),
        ))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
