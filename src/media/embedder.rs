//! Metadata embedding for finished artifacts

use super::traits::{AudioTags, TagWriter};
use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::utils::wait_for_readable;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Waits for a finished artifact and writes tags and cover art into it
///
/// The artifact must become readable within the configured timeout, otherwise the
/// part fails with [`Error::ArtifactMissing`](crate::Error::ArtifactMissing). A failing
/// tag writer is logged and the artifact kept as is.
#[derive(Clone)]
pub struct MetadataEmbedder {
    writer: Arc<dyn TagWriter>,
    timeout: Duration,
    poll_interval: Duration,
}

impl MetadataEmbedder {
    /// Create an embedder around a tag writer
    pub fn new(writer: Arc<dyn TagWriter>, config: &ExecutorConfig) -> Self {
        Self {
            writer,
            timeout: config.artifact_timeout,
            poll_interval: config.poll_interval,
        }
    }

    /// Embed `tags` and `cover` into the artifact at `path`
    pub async fn embed(&self, path: &Path, tags: &AudioTags, cover: Option<&[u8]>) -> Result<()> {
        wait_for_readable(path, self.timeout, self.poll_interval).await?;

        if let Err(e) = self.writer.write_tags(path, tags, cover).await {
            tracing::warn!(
                path = %path.display(),
                writer = self.writer.name(),
                error = %e,
                "Failed to embed metadata, keeping untagged file"
            );
        }
        Ok(())
    }
}
